use thiserror::Error;

use crate::{
    db_types::{ApplicationId, CreditProvider, OrderId},
    traits::{CrmGatewayError, FeedStoreError, ProviderGatewayError},
};

/// Error taxonomy for the credit pipeline.
///
/// `Validation` and `DuplicateSubmission`/`ApplicationExists` messages are shown to CRM managers
/// verbatim, which is why several of them are in the UI's language rather than English.
#[derive(Debug, Error)]
pub enum CreditFlowError {
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("Заявка для заказа {0} уже в процессе отправки")]
    DuplicateSubmission(OrderId),
    #[error("Заказ {0} уже имеет заявку: {1}")]
    ApplicationExists(OrderId, ApplicationId),
    #[error("Order {0} has no application ID")]
    NoApplication(OrderId),
    #[error("Order {order_id} has unknown credit company: {company}")]
    UnknownProvider { order_id: OrderId, company: String },
    #[error("{0}")]
    Validation(String),
    #[error("{0} does not support this action: {1}")]
    UnsupportedAction(CreditProvider, String),
    #[error("Unknown webhook type: {0}")]
    UnknownWebhookEvent(String),
    #[error("Application not found: {0}")]
    UnknownApplication(ApplicationId),
    #[error(transparent)]
    Crm(#[from] CrmGatewayError),
    #[error(transparent)]
    Provider(#[from] ProviderGatewayError),
    #[error(transparent)]
    Store(#[from] FeedStoreError),
}

impl CreditFlowError {
    /// Errors a CRM manager can fix by editing the order, as opposed to infrastructure faults.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            CreditFlowError::Validation(_)
                | CreditFlowError::DuplicateSubmission(_)
                | CreditFlowError::ApplicationExists(_, _)
                | CreditFlowError::NoApplication(_)
                | CreditFlowError::UnknownProvider { .. }
        )
    }
}
