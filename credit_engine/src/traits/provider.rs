use cpg_common::Money;
use serde::Serialize;
use thiserror::Error;

use crate::db_types::{ApplicationId, BankSnapshot, CreditProvider, FileBlob, GoodsLine};

/// Outbound access to the credit partners. One implementation fronts all configured partners and
/// dispatches on the provider tag, so adding a partner does not change any engine signature.
#[allow(async_fn_in_trait)]
pub trait ProviderGateway: Clone {
    /// Create a loan application and return the partner's reference.
    async fn submit_application(&self, request: &SubmissionRequest) -> Result<ApplicationId, ProviderGatewayError>;

    /// Create a point-of-sale financing order (Iute). The application reference is synthesized by
    /// the caller, so the partner only acknowledges with an initial status.
    async fn submit_pos_order(&self, request: &SubmissionRequest) -> Result<PosOrderAck, ProviderGatewayError>;

    /// Current bank-side view of the application. `Ok(None)` means the partner has not finished
    /// processing it yet; callers treat that as "try again later", not as a failure.
    async fn fetch_status(
        &self,
        provider: CreditProvider,
        application_id: &ApplicationId,
    ) -> Result<Option<BankSnapshot>, ProviderGatewayError>;

    async fn upload_files(
        &self,
        provider: CreditProvider,
        application_id: &ApplicationId,
        files: &[FileBlob],
    ) -> Result<(), ProviderGatewayError>;

    /// Contract documents for an approved application. Empty when the partner has not generated
    /// them yet.
    async fn fetch_contracts(
        &self,
        provider: CreditProvider,
        application_id: &ApplicationId,
    ) -> Result<Vec<FileBlob>, ProviderGatewayError>;

    async fn refuse_application(
        &self,
        provider: CreditProvider,
        application_id: &ApplicationId,
        reason: Option<&str>,
    ) -> Result<(), ProviderGatewayError>;

    async fn send_message(
        &self,
        provider: CreditProvider,
        application_id: &ApplicationId,
        text: &str,
        files: Option<&[FileBlob]>,
    ) -> Result<(), ProviderGatewayError>;

    async fn fetch_messages(
        &self,
        provider: CreditProvider,
        application_id: &ApplicationId,
        new_only: bool,
    ) -> Result<Vec<PartnerMessage>, ProviderGatewayError>;
}

/// Which product catalogue entry a submission selects. The shape differs per partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProductSelector {
    /// Microinvest catalogue UUID.
    LoanProduct(String),
    /// Easy Credit numeric product code.
    ProductCode(u32),
    /// Partners without a product catalogue (Iute).
    None,
}

/// A fully normalized application payload. The orchestrator resolves products and formats
/// phone/birthday before this struct is built, so gateway implementations only translate field
/// names into each partner's wire shape.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRequest {
    pub provider: CreditProvider,
    pub idnp: String,
    pub first_name: String,
    pub last_name: String,
    /// `YYYY-MM-DD`.
    pub birth_date: String,
    /// Already in the provider's required format.
    pub phone: String,
    pub amount: Money,
    pub term: u32,
    pub product: ProductSelector,
    pub goods_name: String,
    /// CRM order id or number, for the partner-side comment/reference field.
    pub order_reference: String,
    pub comment: Option<String>,
    pub first_installment_date: Option<String>,
    pub currency: String,
    #[serde(skip_serializing)]
    pub files: Vec<FileBlob>,
    #[serde(skip_serializing)]
    pub goods: Vec<GoodsLine>,
}

impl SubmissionRequest {
    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name.clone()).collect()
    }
}

/// Acknowledgement of a point-of-sale order creation.
#[derive(Debug, Clone)]
pub struct PosOrderAck {
    pub status: String,
    pub myiute_customer: bool,
    pub message: Option<String>,
}

/// One message from a partner's application chat.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerMessage {
    pub date: Option<String>,
    pub sender_id: Option<String>,
    pub sender_name: Option<String>,
    pub text: String,
    pub manager_id: Option<i64>,
    pub manager_name: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum ProviderGatewayError {
    /// The partner returned its own human-readable rejection; shown to the manager verbatim.
    #[error("{0}")]
    PartnerMessage(String),
    #[error("Could not reach {0}: {1}")]
    Transport(CreditProvider, String),
    #[error("Unexpected response from {0}: {1}")]
    Decode(CreditProvider, String),
    #[error("No application reference in the {0} response")]
    MissingReference(CreditProvider),
    #[error("{0} does not support this operation: {1}")]
    Unsupported(CreditProvider, String),
}
