use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    StatusCode,
};

use crate::{
    config::IuteConfig,
    data_objects::{IuteOrderRequest, IuteOrderResponse, IuteStatusResponse},
    PartnerApiError,
};

const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);
const PARTNER_BASE: &str = "/api/v1/physical-api-partners";

/// Iute's physical-partner API. A plain bearer-style key in the `Authorization` header; orders
/// are keyed by the partner-supplied order code.
#[derive(Clone)]
pub struct IuteApi {
    config: IuteConfig,
    client: Arc<Client>,
}

impl IuteApi {
    pub fn new(config: IuteConfig) -> Result<Self, PartnerApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(config.api_key.reveal())
            .map_err(|e| PartnerApiError::Initialization(e.to_string()))?;
        headers.insert("Authorization", auth);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(CONTROL_TIMEOUT)
            .build()
            .map_err(|e| PartnerApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn config(&self) -> &IuteConfig {
        &self.config
    }

    pub async fn create_order(&self, request: &IuteOrderRequest) -> Result<IuteOrderResponse, PartnerApiError> {
        info!(
            "Iute createOrder: {} for {} {}",
            request.order_id, request.total_amount, request.currency
        );
        let url = format!("{}{PARTNER_BASE}/order", self.config.api_url);
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| PartnerApiError::RequestError(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(PartnerApiError::QueryError { status, message });
        }
        let ack: IuteOrderResponse =
            response.json().await.map_err(|e| PartnerApiError::JsonError(e.to_string()))?;
        info!(
            "Iute createOrder response for {}: status {:?}, myiute customer: {}",
            request.order_id, ack.status, ack.myiute_customer
        );
        Ok(ack)
    }

    /// `None` for order codes Iute does not know (404).
    pub async fn get_order_status(&self, order_id: &str) -> Result<Option<IuteStatusResponse>, PartnerApiError> {
        let url = format!("{}{PARTNER_BASE}/orders/{order_id}/status", self.config.api_url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PartnerApiError::RequestError(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            warn!("Iute order {order_id} not found");
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(PartnerApiError::QueryError { status, message });
        }
        let status: IuteStatusResponse =
            response.json().await.map_err(|e| PartnerApiError::JsonError(e.to_string()))?;
        debug!("Iute order {order_id} status: {:?}", status.status);
        Ok(Some(status))
    }

    pub async fn withdraw_order(&self, order_id: &str) -> Result<(), PartnerApiError> {
        info!("Iute withdrawOrder: {order_id}");
        let url = format!("{}{PARTNER_BASE}/orders/{order_id}/withdraw", self.config.api_url);
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| PartnerApiError::RequestError(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(PartnerApiError::QueryError { status, message });
        }
        info!("Iute withdrawOrder succeeded: {order_id}");
        Ok(())
    }
}
