use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    config::MicroinvestConfig,
    data_objects::{
        FileAttachment,
        MicroinvestApplication,
        MicroinvestApplicationResponse,
        MicroinvestContracts,
        MicroinvestMessages,
        MicroinvestStatus,
    },
    PartnerApiError,
};

const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);
const FILE_TIMEOUT: Duration = Duration::from_secs(60);

/// Microinvest's partner API. Everything is a POST; the application being operated on travels in
/// an `applicationID` header rather than the path or body.
#[derive(Clone)]
pub struct MicroinvestApi {
    config: MicroinvestConfig,
    client: Arc<Client>,
}

impl MicroinvestApi {
    pub fn new(config: MicroinvestConfig) -> Result<Self, PartnerApiError> {
        let mut headers = HeaderMap::with_capacity(4);
        headers.insert("Content-Type", HeaderValue::from_static("application/json; charset=utf-8"));
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        let api_key = HeaderValue::from_str(config.api_key.reveal())
            .map_err(|e| PartnerApiError::Initialization(e.to_string()))?;
        headers.insert("apikey", api_key);
        let partner_id = HeaderValue::from_str(&config.partner_id)
            .map_err(|e| PartnerApiError::Initialization(e.to_string()))?;
        headers.insert("partnerID", partner_id);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(CONTROL_TIMEOUT)
            // The partner's endpoint serves a certificate chain clients cannot verify
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| PartnerApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        application_id: Option<&str>,
        body: Option<Value>,
        timeout: Duration,
    ) -> Result<T, PartnerApiError> {
        let url = format!("{}{path}", self.config.api_url);
        trace!("Sending Microinvest query: {url}");
        let mut req = self.client.post(url).timeout(timeout);
        if let Some(id) = application_id {
            let value =
                HeaderValue::from_str(id).map_err(|e| PartnerApiError::RequestError(e.to_string()))?;
            req = req.header("applicationID", value);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| PartnerApiError::RequestError(e.to_string()))?;
        if response.status().is_success() {
            response.json::<T>().await.map_err(|e| PartnerApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| PartnerApiError::ResponseError(e.to_string()))?;
            Err(PartnerApiError::QueryError { status, message })
        }
    }

    pub async fn import_loan_application(
        &self,
        application: &MicroinvestApplication,
    ) -> Result<MicroinvestApplicationResponse, PartnerApiError> {
        info!(
            "Importing loan application: idnp {}, amount {}, term {}",
            application.idnp, application.amount, application.loan_term
        );
        let body = serde_json::to_value(application).map_err(|e| PartnerApiError::JsonError(e.to_string()))?;
        let result: MicroinvestApplicationResponse =
            self.post("/ImportLoanApplication", None, Some(body), CONTROL_TIMEOUT).await?;
        if let Some(id) = &result.application_id {
            info!("Loan application created: {id}");
        }
        Ok(result)
    }

    /// `None` when the application is still being registered on the partner side (their API
    /// answers 404 until then).
    pub async fn check_application_status(
        &self,
        application_id: &str,
    ) -> Result<Option<MicroinvestStatus>, PartnerApiError> {
        match self
            .post::<MicroinvestStatus>("/CheckApplicationStatus", Some(application_id), None, CONTROL_TIMEOUT)
            .await
        {
            Ok(status) => {
                debug!("CheckApplicationStatus [{application_id}]: {:?}", status.status);
                Ok(Some(status))
            },
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND.as_u16()) => {
                warn!("Application {application_id} not found (may still be processing)");
                Ok(None)
            },
            Err(e) => Err(e),
        }
    }

    pub async fn get_contracts(&self, application_id: &str) -> Result<MicroinvestContracts, PartnerApiError> {
        let contracts: MicroinvestContracts =
            self.post("/GetContracts", Some(application_id), None, FILE_TIMEOUT).await?;
        debug!("GetContracts [{application_id}]: {} files", contracts.file_attachment_set.len());
        Ok(contracts)
    }

    /// Upload the signed contract documents back to the partner.
    pub async fn send_contracts(
        &self,
        application_id: &str,
        files: &[FileAttachment],
    ) -> Result<(), PartnerApiError> {
        let body = serde_json::json!({ "fileAttachmentSet": files });
        self.post::<Value>("/SendContracts", Some(application_id), Some(body), FILE_TIMEOUT).await?;
        info!("SendContracts [{application_id}]: {} files", files.len());
        Ok(())
    }

    pub async fn send_refuse_request(
        &self,
        application_id: &str,
        reason: Option<&str>,
    ) -> Result<(), PartnerApiError> {
        debug!("Sending refuse request [{application_id}]: {reason:?}");
        let body = serde_json::json!({ "reason": reason.unwrap_or_default() });
        self.post::<Value>("/SendRefuseRequest", Some(application_id), Some(body), CONTROL_TIMEOUT).await?;
        info!("Refuse request sent [{application_id}]");
        Ok(())
    }

    pub async fn get_messages(
        &self,
        application_id: &str,
        new_messages: bool,
    ) -> Result<MicroinvestMessages, PartnerApiError> {
        let body = serde_json::json!({ "newMessages": new_messages });
        let messages: MicroinvestMessages =
            self.post("/GetMessages", Some(application_id), Some(body), CONTROL_TIMEOUT).await?;
        debug!("GetMessages [{application_id}]: {} messages", messages.message_set.len());
        Ok(messages)
    }

    pub async fn send_message(&self, application_id: &str, text: &str) -> Result<(), PartnerApiError> {
        let body = serde_json::json!({ "text": text });
        self.post::<Value>("/SendMessage", Some(application_id), Some(body), CONTROL_TIMEOUT).await?;
        info!("SendMessage [{application_id}] delivered");
        Ok(())
    }
}
