use credit_engine::flow_objects::{FeedQueryFilter, ManagerInfo};
use serde::{Deserialize, Serialize};

/// Uniform JSON reply for operations without a richer payload.
#[derive(Debug, Clone, Serialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// The embedded CRM widget posts camelCase JSON bodies.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub order_id: i64,
    #[serde(default)]
    pub manager_id: Option<i64>,
    #[serde(default)]
    pub manager_name: Option<String>,
}

impl OrderRequest {
    pub fn manager(&self) -> ManagerInfo {
        ManagerInfo::new(self.manager_id, self.manager_name.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IuteOrderBody {
    pub order_id: i64,
    #[serde(default)]
    pub phone: Option<String>,
    /// Lei, as the widget sends it.
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub manager_id: Option<i64>,
    #[serde(default)]
    pub manager_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefuseRequest {
    pub order_id: i64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub manager_id: Option<i64>,
    #[serde(default)]
    pub manager_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub order_id: i64,
    pub text: String,
    #[serde(default)]
    pub with_files: bool,
    #[serde(default)]
    pub manager_id: Option<i64>,
    #[serde(default)]
    pub manager_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub order_id: i64,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    pub order_id: i64,
    #[serde(default)]
    pub new_only: Option<bool>,
}

/// Query string of the cached-feed endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    #[serde(default)]
    pub archive: Option<bool>,
    #[serde(default)]
    pub bank_status: Option<String>,
    #[serde(default)]
    pub credit_company: Option<String>,
    #[serde(default)]
    pub conditions_changed: Option<bool>,
}

impl FeedQuery {
    pub fn to_filter(&self) -> FeedQueryFilter {
        FeedQueryFilter {
            archived: self.archive,
            bank_status: self.bank_status.clone(),
            provider: self.credit_company.as_deref().and_then(|c| c.parse().ok()),
            conditions_changed: self.conditions_changed,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRequestQuery {
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<i64>,
}

/// Body of an Iute confirm/cancel webhook call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IuteWebhookBody {
    pub order_id: String,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}
