use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use log::*;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::{
    config::SimlaConfig,
    data_objects::{FileAttachment, SimlaFile, SimlaHistoryChange, SimlaOrder, SimlaUser},
    helpers::{content_type_for, is_contract_filename},
    PartnerApiError,
};

const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);
const FILE_TIMEOUT: Duration = Duration::from_secs(120);
const PAGE_LIMIT: u32 = 100;

/// The CRM custom-field keys the credit pipeline reads and writes. The `indp` spelling is the
/// field's actual key in the CRM, typo included.
pub mod crm_fields {
    pub const IDNP: &str = "indp";
    pub const NAME: &str = "name";
    pub const SURNAME: &str = "surname";
    pub const BIRTHDAY: &str = "birthday";
    pub const RESIDENCE: &str = "residence";
    pub const CREDIT_COMPANY: &str = "credit_company";
    pub const CREDIT_TERM: &str = "credit_term";
    pub const ZERO_CREDIT: &str = "zero_credit";
    pub const LOAN_APPLICATION_ID: &str = "loan_application_id";
}

/// Credit-company selector values the CRM filter API knows about.
const FILTER_COMPANIES: [&str; 3] = ["microinvest", "easycredit", "iutecredit"];
/// Credit payment statuses that mark an application as still in play.
const ACTIVE_PAYMENT_STATUSES: [&str; 5] =
    ["not-paid", "credit-check", "credit-approved", "conditions-changed", "credit-declined"];

/// Simla CRM client. GETs carry the API key as a query parameter; edits are form-urlencoded
/// posts with a JSON-encoded entity inside a form field, which is the CRM's own convention.
#[derive(Clone)]
pub struct SimlaApi {
    config: SimlaConfig,
    client: Arc<Client>,
    users_cache: Arc<Mutex<HashMap<i64, SimlaUser>>>,
}

impl SimlaApi {
    pub fn new(config: SimlaConfig) -> Result<Self, PartnerApiError> {
        let client = Client::builder()
            .timeout(CONTROL_TIMEOUT)
            .build()
            .map_err(|e| PartnerApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client), users_cache: Arc::new(Mutex::new(HashMap::new())) })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T, PartnerApiError> {
        let url = format!("{}{path}", self.config.api_url);
        trace!("Sending Simla query: {url}");
        let mut query: Vec<(&str, String)> = vec![("apiKey", self.config.api_key.reveal().clone())];
        query.extend(params.iter().cloned());
        let response = self
            .client
            .get(url)
            .query(&query)
            .send()
            .await
            .map_err(|e| PartnerApiError::RequestError(e.to_string()))?;
        if response.status().is_success() {
            response.json::<T>().await.map_err(|e| PartnerApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(PartnerApiError::QueryError { status, message })
        }
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, PartnerApiError> {
        let url = format!("{}{path}", self.config.api_url);
        let mut body: Vec<(&str, String)> = vec![("apiKey", self.config.api_key.reveal().clone())];
        body.extend(form.iter().cloned());
        let response = self
            .client
            .post(url)
            .form(&body)
            .send()
            .await
            .map_err(|e| PartnerApiError::RequestError(e.to_string()))?;
        if response.status().is_success() {
            response.json::<T>().await.map_err(|e| PartnerApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(PartnerApiError::QueryError { status, message })
        }
    }

    pub async fn get_order(&self, order_id: i64) -> Result<Option<SimlaOrder>, PartnerApiError> {
        #[derive(serde::Deserialize)]
        struct OrderResponse {
            order: Option<SimlaOrder>,
        }
        let response: OrderResponse =
            self.get(&format!("/orders/{order_id}"), &[("by", "id".to_string())]).await?;
        Ok(response.order)
    }

    /// Fan out over every credit company and active payment status the CRM can filter on, and
    /// keep the orders that actually carry an application and have not reached delivery.
    /// Individual filter queries that fail are logged and skipped so one bad page does not lose
    /// the rest of the sweep.
    pub async fn get_orders_with_active_applications(&self) -> Result<Vec<SimlaOrder>, PartnerApiError> {
        #[derive(serde::Deserialize)]
        struct OrdersResponse {
            #[serde(default)]
            orders: Vec<SimlaOrder>,
        }
        let mut orders = Vec::new();
        for company in FILTER_COMPANIES {
            for status in ACTIVE_PAYMENT_STATUSES {
                let params = [
                    ("filter[customFields][credit_company][]", company.to_string()),
                    ("filter[paymentStatuses][]", status.to_string()),
                    ("limit", PAGE_LIMIT.to_string()),
                ];
                match self.get::<OrdersResponse>("/orders", &params).await {
                    Ok(response) => orders.extend(response.orders),
                    Err(e) => {
                        error!("Order filter query failed ({company}/{status}): {e}");
                    },
                }
            }
        }
        let filtered: Vec<SimlaOrder> = orders
            .into_iter()
            .filter(|order| {
                let app_id = order
                    .custom_fields
                    .get(crm_fields::LOAN_APPLICATION_ID)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                !app_id.is_empty() && order.status.as_deref() != Some("delivering")
            })
            .collect();
        debug!("Found {} orders with active applications", filtered.len());
        Ok(filtered)
    }

    async fn resolve_site(&self, order_id: i64, site: Option<&str>) -> Result<String, PartnerApiError> {
        if let Some(site) = site {
            return Ok(site.to_string());
        }
        let order = self.get_order(order_id).await?;
        order
            .and_then(|o| o.site)
            .ok_or_else(|| PartnerApiError::RequestError(format!("Site is required for order {order_id} update")))
    }

    pub async fn update_order_custom_fields(
        &self,
        order_id: i64,
        custom_fields: Value,
        site: Option<&str>,
    ) -> Result<(), PartnerApiError> {
        let site = self.resolve_site(order_id, site).await?;
        let order = json!({ "customFields": custom_fields }).to_string();
        self.post_form::<Value>(
            &format!("/orders/{order_id}/edit?by=id"),
            &[("site", site), ("order", order)],
        )
        .await?;
        debug!("Order {order_id} custom fields updated");
        Ok(())
    }

    pub async fn update_payment_status(
        &self,
        order_id: i64,
        payment_id: &str,
        status: &str,
        site: Option<&str>,
    ) -> Result<(), PartnerApiError> {
        let site = self.resolve_site(order_id, site).await?;
        let payment = json!({ "status": status }).to_string();
        self.post_form::<Value>(
            &format!("/orders/payments/{payment_id}/edit"),
            &[("site", site), ("payment", payment)],
        )
        .await?;
        info!("Payment {payment_id} of order {order_id} moved to '{status}'");
        Ok(())
    }

    pub async fn update_order_status(
        &self,
        order_id: i64,
        status: &str,
        site: Option<&str>,
    ) -> Result<(), PartnerApiError> {
        let site = self.resolve_site(order_id, site).await?;
        let order = json!({ "status": status }).to_string();
        self.post_form::<Value>(
            &format!("/orders/{order_id}/edit?by=id"),
            &[("site", site), ("order", order)],
        )
        .await?;
        info!("Order {order_id} moved to '{status}'");
        Ok(())
    }

    pub async fn get_order_files(&self, order_id: i64, site: Option<&str>) -> Result<Vec<SimlaFile>, PartnerApiError> {
        #[derive(serde::Deserialize)]
        struct FilesResponse {
            #[serde(default)]
            files: Vec<SimlaFile>,
        }
        let site = self.resolve_site(order_id, site).await?;
        let params = [
            ("filter[orderIds][]", order_id.to_string()),
            ("filter[sites][]", site),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        let response: FilesResponse = self.get("/files", &params).await?;
        debug!("Order {order_id} has {} files", response.files.len());
        Ok(response.files)
    }

    /// Download one attachment. Errors are logged and collapsed to `None` so one unreadable file
    /// does not sink a whole submission's attachment set.
    pub async fn download_file(&self, file_id: i64) -> Option<String> {
        let url = format!("{}/files/{file_id}/download", self.config.api_url);
        let result = self
            .client
            .get(url)
            .query(&[("apiKey", self.config.api_key.reveal())])
            .timeout(FILE_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => match response.bytes().await {
                Ok(bytes) => {
                    debug!("Downloaded file {file_id} ({} bytes)", bytes.len());
                    Some(base64::encode(&bytes))
                },
                Err(e) => {
                    error!("Could not read file {file_id}: {e}");
                    None
                },
            },
            Ok(response) => {
                error!("File {file_id} download failed with status {}", response.status());
                None
            },
            Err(e) => {
                error!("File {file_id} download failed: {e}");
                None
            },
        }
    }

    pub async fn get_order_files_as_base64(
        &self,
        order_id: i64,
        site: Option<&str>,
    ) -> Result<Vec<FileAttachment>, PartnerApiError> {
        let files = self.get_order_files(order_id, site).await?;
        let mut result = Vec::with_capacity(files.len());
        for file in files {
            if let Some(data) = self.download_file(file.id).await {
                let name = file.filename.unwrap_or_else(|| format!("file_{}", file.id));
                result.push(FileAttachment { name, data });
            }
        }
        Ok(result)
    }

    /// Upload a file and attach it to the order. The CRM splits this into a raw upload followed
    /// by an edit that renames the file and links it to the order.
    pub async fn upload_file_to_order(
        &self,
        order_id: i64,
        filename: &str,
        base64_data: &str,
        site: Option<&str>,
    ) -> Result<(), PartnerApiError> {
        #[derive(serde::Deserialize)]
        struct UploadResponse {
            file: Option<SimlaFile>,
        }
        let _site = self.resolve_site(order_id, site).await?;
        let bytes = base64::decode(base64_data)
            .map_err(|e| PartnerApiError::InvalidAttachment(filename.to_string(), e.to_string()))?;
        if bytes.is_empty() {
            return Err(PartnerApiError::InvalidAttachment(filename.to_string(), "empty file".to_string()));
        }
        let url = format!("{}/files/upload", self.config.api_url);
        let response = self
            .client
            .post(url)
            .query(&[("apiKey", self.config.api_key.reveal())])
            .header("Content-Type", content_type_for(filename))
            .timeout(FILE_TIMEOUT)
            .body(bytes)
            .send()
            .await
            .map_err(|e| PartnerApiError::RequestError(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(PartnerApiError::QueryError { status, message });
        }
        let uploaded: UploadResponse =
            response.json().await.map_err(|e| PartnerApiError::JsonError(e.to_string()))?;
        let file_id = uploaded
            .file
            .map(|f| f.id)
            .ok_or_else(|| PartnerApiError::ResponseError("No file ID in upload response".to_string()))?;

        let file = json!({
            "filename": filename,
            "attachment": [{ "order": { "id": order_id } }],
        })
        .to_string();
        self.post_form::<Value>(&format!("/files/{file_id}/edit"), &[("file", file)]).await?;
        info!("File '{filename}' uploaded and attached to order {order_id}");
        Ok(())
    }

    pub async fn check_order_has_contract_files(
        &self,
        order_id: i64,
        site: Option<&str>,
    ) -> Result<bool, PartnerApiError> {
        let files = self.get_order_files(order_id, site).await?;
        Ok(files
            .iter()
            .any(|file| is_contract_filename(file.filename.as_deref().unwrap_or_default())))
    }

    /// Users change rarely; cache them for the life of the process.
    pub async fn get_user(&self, user_id: i64) -> Option<SimlaUser> {
        if let Some(user) = self
            .users_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned()
        {
            return Some(user);
        }
        #[derive(serde::Deserialize)]
        struct UserResponse {
            user: Option<SimlaUser>,
        }
        match self.get::<UserResponse>(&format!("/users/{user_id}"), &[]).await {
            Ok(UserResponse { user: Some(user) }) => {
                self.users_cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(user_id, user.clone());
                Some(user)
            },
            Ok(UserResponse { user: None }) => None,
            Err(e) => {
                error!("Could not fetch user {user_id}: {e}");
                None
            },
        }
    }

    pub async fn get_manager_name(&self, manager_id: i64) -> Option<String> {
        let user = self.get_user(manager_id).await?;
        let parts: Vec<&str> = [user.first_name.as_deref(), user.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            user.email
        } else {
            Some(parts.join(" "))
        }
    }

    pub async fn get_orders_history(
        &self,
        since_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<SimlaHistoryChange>, PartnerApiError> {
        #[derive(serde::Deserialize)]
        struct HistoryResponse {
            #[serde(default)]
            history: Vec<SimlaHistoryChange>,
        }
        let mut params = vec![("limit", limit.to_string())];
        if let Some(since_id) = since_id {
            params.push(("sinceId", since_id.to_string()));
        }
        let response: HistoryResponse = self.get("/orders/history", &params).await?;
        Ok(response.history)
    }
}
