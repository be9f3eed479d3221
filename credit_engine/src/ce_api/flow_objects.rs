use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{ApplicationId, CreditProvider, CrmStatus, FeedItem, FileBlob, OrderId};

//--------------------------------------   FeedQueryFilter    ---------------------------------------------------------
/// Filter for cached-feed reads. All fields are conjunctive; the default matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedQueryFilter {
    /// `Some(true)` restricts to orders whose cached lifecycle status is in the archived set,
    /// `Some(false)` to the rest (a missing order status counts as non-archived).
    pub archived: Option<bool>,
    pub bank_status: Option<String>,
    pub provider: Option<CreditProvider>,
    pub conditions_changed: Option<bool>,
}

impl FeedQueryFilter {
    pub fn archived(mut self, archived: bool) -> Self {
        self.archived = Some(archived);
        self
    }

    pub fn with_bank_status(mut self, status: impl Into<String>) -> Self {
        self.bank_status = Some(status.into());
        self
    }

    pub fn with_provider(mut self, provider: CreditProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_conditions_changed(mut self, changed: bool) -> Self {
        self.conditions_changed = Some(changed);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.archived.is_none()
            && self.bank_status.is_none()
            && self.provider.is_none()
            && self.conditions_changed.is_none()
    }
}

//--------------------------------------     ManagerInfo      ---------------------------------------------------------
/// The CRM user performing an operation, threaded through for history attribution. Absent for
/// unattended (cron/webhook) work.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerInfo {
    pub manager_id: Option<i64>,
    pub manager_name: Option<String>,
}

impl ManagerInfo {
    pub fn new(manager_id: Option<i64>, manager_name: Option<String>) -> Self {
        Self { manager_id, manager_name }
    }
}

//--------------------------------------      Outcomes        ---------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    pub order_id: OrderId,
    pub application_id: ApplicationId,
    pub files_count: usize,
    /// False when the application was created but the follow-up document upload failed. The
    /// application is NOT rolled back in that case; the files can be re-sent later.
    pub files_uploaded: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IuteSubmissionOutcome {
    pub order_id: OrderId,
    pub application_id: ApplicationId,
    pub status: String,
    pub myiute_customer: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub order_id: OrderId,
    pub application_id: ApplicationId,
    pub bank_status: String,
    pub document_status: Option<String>,
    pub crm_status: CrmStatus,
    pub is_final: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSummary {
    /// Orders the pass looked at (after de-duplication and archive filtering).
    pub total: usize,
    /// Orders for which the partner reported a mapped status.
    pub updated: usize,
    /// Orders whose bank status is terminal.
    pub finalized: usize,
    pub outcomes: Vec<ReconcileOutcome>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub synced: usize,
    pub stale_refreshed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySyncReport {
    pub processed: usize,
    pub saved: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedFeed {
    pub items: Vec<FeedItem>,
    pub last_sync: Option<DateTime<Utc>>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesOutcome {
    pub order_id: OrderId,
    pub application_id: ApplicationId,
    pub credit_company: CreditProvider,
    pub files_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractsOutcome {
    pub order_id: OrderId,
    pub application_id: ApplicationId,
    pub files: Vec<FileBlob>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefuseOutcome {
    pub order_id: OrderId,
    pub application_id: ApplicationId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    pub application_id: ApplicationId,
    pub status: String,
}

/// Iute notifies order completion and cancellation via webhook callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    Confirm,
    Cancel,
}

impl WebhookKind {
    pub fn bank_status(&self) -> &'static str {
        match self {
            WebhookKind::Confirm => "PAID",
            WebhookKind::Cancel => "CANCELLED",
        }
    }

    pub fn default_details(&self) -> &'static str {
        match self {
            WebhookKind::Confirm => "Кредит выдан",
            WebhookKind::Cancel => "Заявка отменена",
        }
    }
}

impl std::str::FromStr for WebhookKind {
    type Err = crate::db_types::ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirm" => Ok(Self::Confirm),
            "cancel" => Ok(Self::Cancel),
            other => Err(crate::db_types::ConversionError(format!("Unknown webhook type: {other}"))),
        }
    }
}
