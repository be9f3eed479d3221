//! `SqliteFeedStore` is the concrete [`FeedStore`] backend.
//!
//! It holds a connection pool and forwards each trait method to the low-level query functions in
//! the sibling modules.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::warn;
use sqlx::SqlitePool;

use super::{feed, history, messages, metadata, new_pool, requests, MIGRATOR};
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
    traits::{FeedStore, FeedStoreError},
};

const LAST_SYNC_KEY: &str = "feed_last_sync";

#[derive(Clone)]
pub struct SqliteFeedStore {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteFeedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteFeedStore ({:?})", self.pool)
    }
}

impl SqliteFeedStore {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, FeedStoreError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Bring the schema up to date. Call once on startup; migrations are idempotent.
    pub async fn run_migrations(&self) -> Result<(), FeedStoreError> {
        MIGRATOR.run(&self.pool).await.map_err(|e| FeedStoreError::DatabaseError(e.to_string()))
    }
}

impl FeedStore for SqliteFeedStore {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn upsert_feed_item(&self, item: &NewFeedItem) -> Result<(), FeedStoreError> {
        let mut conn = self.pool.acquire().await?;
        feed::upsert_feed_item(item, &mut conn).await
    }

    async fn feed_items(&self, filter: &FeedQueryFilter) -> Result<Vec<FeedItem>, FeedStoreError> {
        let mut conn = self.pool.acquire().await?;
        feed::fetch_feed_items(filter, &mut conn).await
    }

    async fn feed_item(&self, order_id: OrderId) -> Result<Option<FeedItem>, FeedStoreError> {
        let mut conn = self.pool.acquire().await?;
        feed::fetch_feed_item(order_id, &mut conn).await
    }

    async fn feed_item_by_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<FeedItem>, FeedStoreError> {
        let mut conn = self.pool.acquire().await?;
        feed::fetch_feed_item_by_application(application_id, &mut conn).await
    }

    async fn delete_feed_item(&self, order_id: OrderId) -> Result<bool, FeedStoreError> {
        let mut conn = self.pool.acquire().await?;
        feed::delete_feed_item(order_id, &mut conn).await
    }

    async fn update_application_status(
        &self,
        application_id: &ApplicationId,
        bank_status: &str,
        crm_status: Option<&str>,
    ) -> Result<(), FeedStoreError> {
        let mut conn = self.pool.acquire().await?;
        feed::update_application_status(application_id, bank_status, crm_status, &mut conn).await
    }

    async fn append_status_history(&self, entry: &NewStatusEntry) -> Result<(), FeedStoreError> {
        let mut conn = self.pool.acquire().await?;
        history::append_entry(entry, &mut conn).await
    }

    async fn status_history(&self, application_id: &ApplicationId) -> Result<Vec<StatusHistoryEntry>, FeedStoreError> {
        let mut conn = self.pool.acquire().await?;
        history::fetch_history(application_id, &mut conn).await
    }

    async fn save_application_request(&self, request: &NewApplicationRequest) -> Result<(), FeedStoreError> {
        let mut conn = self.pool.acquire().await?;
        requests::upsert_request(request, &mut conn).await
    }

    async fn application_request(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<ApplicationRequest>, FeedStoreError> {
        let mut conn = self.pool.acquire().await?;
        requests::fetch_request(application_id, &mut conn).await
    }

    async fn application_request_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<ApplicationRequest>, FeedStoreError> {
        let mut conn = self.pool.acquire().await?;
        requests::fetch_request_for_order(order_id, &mut conn).await
    }

    async fn metadata(&self, key: &str) -> Result<Option<String>, FeedStoreError> {
        let mut conn = self.pool.acquire().await?;
        metadata::get(key, &mut conn).await
    }

    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), FeedStoreError> {
        let mut conn = self.pool.acquire().await?;
        metadata::set(key, value, &mut conn).await
    }

    async fn last_sync(&self) -> Result<Option<DateTime<Utc>>, FeedStoreError> {
        let mut conn = self.pool.acquire().await?;
        let value = metadata::get(LAST_SYNC_KEY, &mut conn).await?;
        Ok(value.and_then(|v| {
            DateTime::parse_from_rfc3339(&v)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| warn!("🗃️ Unreadable {LAST_SYNC_KEY} value '{v}': {e}"))
                .ok()
        }))
    }

    async fn touch_last_sync(&self) -> Result<DateTime<Utc>, FeedStoreError> {
        let now = Utc::now();
        let mut conn = self.pool.acquire().await?;
        metadata::set(LAST_SYNC_KEY, &now.to_rfc3339(), &mut conn).await?;
        Ok(now)
    }

    async fn save_sent_message(&self, message: &NewSentMessage) -> Result<(), FeedStoreError> {
        let mut conn = self.pool.acquire().await?;
        messages::insert_sent_message(message, &mut conn).await
    }

    async fn sent_messages(&self, application_id: &ApplicationId) -> Result<Vec<SentMessage>, FeedStoreError> {
        let mut conn = self.pool.acquire().await?;
        messages::fetch_sent_messages(application_id, &mut conn).await
    }
}
