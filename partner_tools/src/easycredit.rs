use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{
    multipart::{Form, Part},
    Client,
    StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::{
    config::EasyCreditConfig,
    data_objects::{EcContract, EcEnvelope, EcRequestAck, EcStatus, FileAttachment},
    helpers::content_type_for,
    PartnerApiError,
};

const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);
const FILE_TIMEOUT: Duration = Duration::from_secs(120);
const UPLOAD_RETRIES: usize = 2;
const UPLOAD_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Easy Credit's shop API. Credentials travel inside every request body (on top of basic auth),
/// responses come wrapped in a `response` envelope, and file uploads go to a dedicated host as
/// multipart form data.
#[derive(Clone)]
pub struct EasyCreditApi {
    config: EasyCreditConfig,
    client: Arc<Client>,
    files_client: Arc<Client>,
}

impl EasyCreditApi {
    pub fn new(config: EasyCreditConfig) -> Result<Self, PartnerApiError> {
        let client = Client::builder()
            .timeout(CONTROL_TIMEOUT)
            .build()
            .map_err(|e| PartnerApiError::Initialization(e.to_string()))?;
        let files_client = Client::builder()
            .timeout(FILE_TIMEOUT)
            .build()
            .map_err(|e| PartnerApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client), files_client: Arc::new(files_client) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}{path}", self.config.api_url, self.config.environment)
    }

    fn with_credentials(&self, mut body: Value) -> Value {
        body["Login"] = json!(self.config.login);
        body["Password"] = json!(self.config.password.reveal());
        body
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<Option<T>, PartnerApiError> {
        let url = self.url(path);
        trace!("Sending Easy Credit query: {url}");
        let response = self
            .client
            .post(url)
            .basic_auth(&self.config.login, Some(self.config.password.reveal()))
            .json(&self.with_credentials(body))
            .send()
            .await
            .map_err(|e| PartnerApiError::RequestError(e.to_string()))?;
        if response.status().is_success() {
            let envelope: EcEnvelope<T> =
                response.json().await.map_err(|e| PartnerApiError::JsonError(e.to_string()))?;
            Ok(envelope.response)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            // The bank reports validation problems as a message buried in one of several
            // envelope shapes; surface it verbatim when present.
            if let Some(message) = extract_partner_message(&body) {
                return Err(PartnerApiError::PartnerMessage(message));
            }
            Err(PartnerApiError::QueryError { status, message: body })
        }
    }

    pub async fn create_request(&self, payload: Value) -> Result<EcRequestAck, PartnerApiError> {
        let ack = self
            .post::<EcRequestAck>("/Request_v3", payload)
            .await?
            .ok_or_else(|| PartnerApiError::ResponseError("Empty Request_v3 response".to_string()))?;
        if let Some(urn) = &ack.urn {
            info!("Easy Credit request created: URN {urn}");
        }
        Ok(ack)
    }

    /// `None` when the URN is not known to the partner yet.
    pub async fn check_status(&self, urn: &str) -> Result<Option<EcStatus>, PartnerApiError> {
        match self.post::<EcStatus>("/URNStatus_v2", json!({ "URN": urn })).await {
            Ok(status) => {
                if let Some(s) = &status {
                    debug!(
                        "URNStatus_v2 [{urn}]: request {:?}, documents {:?}",
                        s.request_status, s.document_status
                    );
                }
                Ok(status)
            },
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND.as_u16()) => {
                warn!("URN {urn} not found");
                Ok(None)
            },
            Err(e) => Err(e),
        }
    }

    pub async fn get_contract(&self, urn: &str, language: &str) -> Result<Option<EcContract>, PartnerApiError> {
        let contract = self
            .post::<EcContract>("/ECM_GetDocs_V2", json!({ "URN": urn, "Language": language }))
            .await?;
        debug!("ECM_GetDocs_V2 [{urn}]: has file: {}", contract.as_ref().map(|c| c.doc_type_a.is_some()).unwrap_or(false));
        Ok(contract)
    }

    pub async fn cancel_request(&self, urn: &str) -> Result<(), PartnerApiError> {
        self.post::<Value>("/ECM_CancelRequest", json!({ "URN": urn })).await?;
        info!("Easy Credit request canceled: {urn}");
        Ok(())
    }

    /// Upload identity/contract documents for a URN. The file endpoint intermittently answers
    /// 401/503 right after an application is created, so those two statuses are retried a
    /// bounded number of times with a fixed delay.
    pub async fn upload_files(&self, urn: &str, files: &[FileAttachment]) -> Result<(), PartnerApiError> {
        let mut attempt = 0;
        loop {
            match self.upload_files_once(urn, files).await {
                Ok(()) => {
                    info!("Files uploaded to Easy Credit [{urn}]: {} files", files.len());
                    return Ok(());
                },
                Err(e) => {
                    let status = e.status();
                    let retryable = matches!(status, Some(401) | Some(503));
                    error!(
                        "Easy Credit file upload failed [{urn}] (attempt {}): {e}",
                        attempt + 1
                    );
                    if !retryable || attempt >= UPLOAD_RETRIES {
                        return Err(e);
                    }
                    attempt += 1;
                    info!("Retrying Easy Credit file upload in {UPLOAD_RETRY_DELAY:?} [{urn}]");
                    tokio::time::sleep(UPLOAD_RETRY_DELAY).await;
                },
            }
        }
    }

    async fn upload_files_once(&self, urn: &str, files: &[FileAttachment]) -> Result<(), PartnerApiError> {
        let mut form = Form::new()
            .text("Login", self.config.login.clone())
            .text("Password", self.config.password.reveal().clone())
            .text("URN", urn.to_string());
        for file in files {
            let bytes = base64::decode(&file.data)
                .map_err(|e| PartnerApiError::InvalidAttachment(file.name.clone(), e.to_string()))?;
            let part = Part::bytes(bytes)
                .file_name(file.name.clone())
                .mime_str(content_type_for(&file.name))
                .map_err(|e| PartnerApiError::InvalidAttachment(file.name.clone(), e.to_string()))?;
            form = form.part("files", part);
        }
        let url = format!("{}/{}/files/upload", self.config.files_url, self.config.environment);
        let response = self
            .files_client
            .post(url)
            .basic_auth(&self.config.login, Some(self.config.password.reveal()))
            .multipart(form)
            .send()
            .await
            .map_err(|e| PartnerApiError::RequestError(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(PartnerApiError::QueryError { status, message })
        }
    }
}

/// Pull the bank's own error text out of whichever envelope it used this time.
fn extract_partner_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let candidates = [
        &value["response"]["Message"],
        &value["message"],
        &value["detail"],
    ];
    for candidate in candidates {
        match candidate {
            Value::String(s) if !s.is_empty() => return Some(s.clone()),
            Value::String(_) | Value::Null => {},
            other => return Some(other.to_string()),
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partner_message_extraction() {
        let body = r#"{"response": {"Message": "UIN invalid"}}"#;
        assert_eq!(extract_partner_message(body).as_deref(), Some("UIN invalid"));
        let body = r#"{"message": "Unauthorized"}"#;
        assert_eq!(extract_partner_message(body).as_deref(), Some("Unauthorized"));
        let body = r#"{"detail": [{"loc": ["CreditAmount"]}]}"#;
        assert!(extract_partner_message(body).unwrap().contains("CreditAmount"));
        assert!(extract_partner_message("not json").is_none());
        assert!(extract_partner_message("{}").is_none());
    }
}
