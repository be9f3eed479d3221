use std::fmt::Debug;

use log::*;

use crate::{
    ce_api::{
        errors::CreditFlowError,
        flow_objects::{CachedFeed, FeedQueryFilter},
    },
    db_types::{ApplicationId, ApplicationRequest, OrderId, StatusHistoryEntry},
    traits::FeedStore,
};

/// Read-side API over the feed cache.
///
/// It is generic over the store alone, with no partner or CRM collaborator in scope, so cached
/// reads stay independent of partner availability even when every partner is down.
pub struct FeedApi<B> {
    db: B,
}

impl<B> Debug for FeedApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FeedApi")
    }
}

impl<B> FeedApi<B>
where B: FeedStore
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// The cached feed with its last-sync stamp. Never triggers a partner or CRM call.
    pub async fn cached_feed(&self, filter: &FeedQueryFilter) -> Result<CachedFeed, CreditFlowError> {
        debug!("🗂️ Reading cached feed with filter {filter:?}");
        let items = self.db.feed_items(filter).await?;
        let last_sync = self.db.last_sync().await?;
        let count = items.len();
        Ok(CachedFeed { items, last_sync, count })
    }

    /// Explicitly drop one order from the feed. The sync loop never deletes rows itself.
    pub async fn remove_item(&self, order_id: OrderId) -> Result<bool, CreditFlowError> {
        let removed = self.db.delete_feed_item(order_id).await?;
        if removed {
            info!("🗂️ Feed item for order {order_id} removed");
        }
        Ok(removed)
    }

    pub async fn status_history(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<StatusHistoryEntry>, CreditFlowError> {
        Ok(self.db.status_history(application_id).await?)
    }

    /// The audit copy of a submitted application payload, looked up by application reference or,
    /// failing that, by order.
    pub async fn application_request(
        &self,
        application_id: Option<&ApplicationId>,
        order_id: Option<OrderId>,
    ) -> Result<Option<ApplicationRequest>, CreditFlowError> {
        let request = match (application_id, order_id) {
            (Some(app), _) => self.db.application_request(app).await?,
            (None, Some(order)) => self.db.application_request_for_order(order).await?,
            (None, None) => None,
        };
        Ok(request)
    }
}
