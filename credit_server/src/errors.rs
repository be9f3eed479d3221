use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use credit_engine::CreditFlowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Webhook signature invalid or not provided")]
    InvalidWebhookSignature,
    #[error("{0}")]
    Flow(#[from] CreditFlowError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Flow(e) => flow_status_code(e),
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidWebhookSignature => StatusCode::UNAUTHORIZED,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "success": false, "error": self.to_string() }).to_string())
    }
}

fn flow_status_code(e: &CreditFlowError) -> StatusCode {
    match e {
        CreditFlowError::Validation(_) => StatusCode::BAD_REQUEST,
        CreditFlowError::DuplicateSubmission(_) => StatusCode::CONFLICT,
        CreditFlowError::ApplicationExists(_, _) => StatusCode::CONFLICT,
        CreditFlowError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        CreditFlowError::UnknownApplication(_) => StatusCode::NOT_FOUND,
        CreditFlowError::NoApplication(_) => StatusCode::BAD_REQUEST,
        CreditFlowError::UnknownProvider { .. } => StatusCode::BAD_REQUEST,
        CreditFlowError::UnknownWebhookEvent(_) => StatusCode::BAD_REQUEST,
        CreditFlowError::UnsupportedAction(_, _) => StatusCode::BAD_REQUEST,
        // The partner is unreachable or talking nonsense: the gateway itself is fine
        CreditFlowError::Provider(_) => StatusCode::BAD_GATEWAY,
        CreditFlowError::Crm(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CreditFlowError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod test {
    use credit_engine::db_types::OrderId;

    use super::*;

    #[test]
    fn user_correctable_errors_map_to_4xx() {
        let err = ServerError::Flow(CreditFlowError::Validation("Не указан IDNP клиента".into()));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let err = ServerError::Flow(CreditFlowError::DuplicateSubmission(OrderId(5)));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        let err = ServerError::Flow(CreditFlowError::OrderNotFound(OrderId(5)));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn infrastructure_errors_map_to_5xx() {
        use credit_engine::traits::ProviderGatewayError;
        let err = ServerError::Flow(CreditFlowError::Provider(ProviderGatewayError::Transport(
            credit_engine::db_types::CreditProvider::Microinvest,
            "timeout".into(),
        )));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn error_body_is_json_with_the_message() {
        let err = ServerError::Flow(CreditFlowError::Validation("Имя должно быть на латинице".into()));
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
