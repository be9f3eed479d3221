use thiserror::Error;

use crate::db_types::{ApplicationId, CreditProvider, CrmOrder, CrmStatus, FileBlob, OrderId};

/// Access to the CRM that owns the orders. The CRM is authoritative for order and payment state;
/// this system only reads orders and pushes status/linkage updates back.
#[allow(async_fn_in_trait)]
pub trait CrmGateway: Clone {
    /// Fetch one order, normalized to the fields the credit pipeline uses.
    async fn fetch_order(&self, id: OrderId) -> Result<Option<CrmOrder>, CrmGatewayError>;

    /// All orders that currently carry an active loan application, across every provider and
    /// credit payment status the CRM filters support. May contain duplicates when an order
    /// matches several filter combinations; callers de-duplicate.
    async fn orders_with_active_applications(&self) -> Result<Vec<CrmOrder>, CrmGatewayError>;

    /// Record the provider's application reference on the order. This is the durable linkage
    /// between the CRM order and the bank-side application.
    async fn link_application(
        &self,
        id: OrderId,
        application_id: &ApplicationId,
        provider: CreditProvider,
        site: Option<&str>,
    ) -> Result<(), CrmGatewayError>;

    async fn update_payment_status(
        &self,
        id: OrderId,
        payment_id: &str,
        status: CrmStatus,
        site: Option<&str>,
    ) -> Result<(), CrmGatewayError>;

    async fn update_order_status(&self, id: OrderId, status: &str, site: Option<&str>)
        -> Result<(), CrmGatewayError>;

    /// The order's attachments as base64 blobs, in upload order.
    async fn order_files(&self, id: OrderId, site: Option<&str>) -> Result<Vec<FileBlob>, CrmGatewayError>;

    async fn upload_file(
        &self,
        id: OrderId,
        name: &str,
        data: &str,
        site: Option<&str>,
    ) -> Result<(), CrmGatewayError>;

    /// Whether the order already carries contract-like files (used to keep contract auto-attach
    /// idempotent).
    async fn has_contract_files(&self, id: OrderId, site: Option<&str>) -> Result<bool, CrmGatewayError>;

    async fn manager_name(&self, manager_id: i64) -> Result<Option<String>, CrmGatewayError>;

    /// Order-change history events after the given cursor, oldest first.
    async fn history_since(&self, since_id: Option<i64>, limit: u32) -> Result<Vec<CrmFieldChange>, CrmGatewayError>;
}

/// One field change from the CRM's order history feed.
#[derive(Debug, Clone, Default)]
pub struct CrmFieldChange {
    pub id: i64,
    pub order_id: Option<OrderId>,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub source: Option<String>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Error)]
pub enum CrmGatewayError {
    #[error("CRM request failed. {0}")]
    Request(String),
    #[error("Could not decode the CRM response. {0}")]
    Decode(String),
    #[error("Site is required to update order {0}")]
    MissingSite(OrderId),
}
