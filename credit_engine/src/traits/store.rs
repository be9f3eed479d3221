use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{
        ApplicationId,
        ApplicationRequest,
        FeedItem,
        NewApplicationRequest,
        NewFeedItem,
        NewSentMessage,
        NewStatusEntry,
        OrderId,
        SentMessage,
        StatusHistoryEntry,
    },
    flow_objects::FeedQueryFilter,
};

/// The durable cache behind the CRM-facing feed: last-known reconciled state per order, the
/// append-only status history, submission audit copies, and a small key-value space for sync
/// cursors. Reads through this trait never touch a partner API.
#[allow(async_fn_in_trait)]
pub trait FeedStore: Clone {
    /// The URL of the backing database.
    fn url(&self) -> &str;

    /// Insert or update the feed row for the item's order id.
    async fn upsert_feed_item(&self, item: &NewFeedItem) -> Result<(), FeedStoreError>;

    /// Feed rows matching the filter, newest orders first.
    async fn feed_items(&self, filter: &FeedQueryFilter) -> Result<Vec<FeedItem>, FeedStoreError>;

    async fn feed_item(&self, order_id: OrderId) -> Result<Option<FeedItem>, FeedStoreError>;

    async fn feed_item_by_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<FeedItem>, FeedStoreError>;

    /// Remove a feed row. Returns false when no row existed. The reconciliation loop never calls
    /// this; removal is an explicit operator action.
    async fn delete_feed_item(&self, order_id: OrderId) -> Result<bool, FeedStoreError>;

    /// Point update of the cached bank (and optionally CRM) status for an application, used by
    /// webhook events that arrive between sync passes.
    async fn update_application_status(
        &self,
        application_id: &ApplicationId,
        bank_status: &str,
        crm_status: Option<&str>,
    ) -> Result<(), FeedStoreError>;

    /// Append one transition to the history log. Rows are never updated or deleted.
    async fn append_status_history(&self, entry: &NewStatusEntry) -> Result<(), FeedStoreError>;

    /// All recorded transitions for an application, oldest first.
    async fn status_history(&self, application_id: &ApplicationId) -> Result<Vec<StatusHistoryEntry>, FeedStoreError>;

    async fn save_application_request(&self, request: &NewApplicationRequest) -> Result<(), FeedStoreError>;

    async fn application_request(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<ApplicationRequest>, FeedStoreError>;

    async fn application_request_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<ApplicationRequest>, FeedStoreError>;

    async fn metadata(&self, key: &str) -> Result<Option<String>, FeedStoreError>;

    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), FeedStoreError>;

    /// When the feed was last synced from live partner data, if ever.
    async fn last_sync(&self) -> Result<Option<DateTime<Utc>>, FeedStoreError>;

    /// Stamp the feed as synced now and return the timestamp written.
    async fn touch_last_sync(&self) -> Result<DateTime<Utc>, FeedStoreError>;

    async fn save_sent_message(&self, message: &NewSentMessage) -> Result<(), FeedStoreError>;

    /// Messages previously sent for an application, oldest first.
    async fn sent_messages(&self, application_id: &ApplicationId) -> Result<Vec<SentMessage>, FeedStoreError>;
}

#[derive(Debug, Clone, Error)]
pub enum FeedStoreError {
    #[error("Feed store engine error: {0}")]
    DatabaseError(String),
    #[error("Invalid feed query: {0}")]
    QueryError(String),
}

impl From<sqlx::Error> for FeedStoreError {
    fn from(e: sqlx::Error) -> Self {
        FeedStoreError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for FeedStoreError {
    fn from(e: serde_json::Error) -> Self {
        FeedStoreError::QueryError(e.to_string())
    }
}
