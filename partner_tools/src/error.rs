use thiserror::Error;

#[derive(Debug, Error)]
pub enum PartnerApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Request failed: {0}")]
    RequestError(String),
    #[error("Invalid response: {0}")]
    ResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    /// The partner's own human-readable rejection, extracted from the response body.
    #[error("{0}")]
    PartnerMessage(String),
    #[error("No application reference in response")]
    MissingReference,
    #[error("Invalid file attachment '{0}': {1}")]
    InvalidAttachment(String, String),
}

impl PartnerApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            PartnerApiError::QueryError { status, .. } => Some(*status),
            _ => None,
        }
    }
}
