use std::{collections::HashSet, fmt::Debug, time::Duration};

use chrono::{DateTime, NaiveDateTime, Utc};
use log::*;

use crate::{
    ce_api::{
        errors::CreditFlowError,
        flow_objects::{
            CheckSummary,
            ContractsOutcome,
            FeedQueryFilter,
            FilesOutcome,
            HistorySyncReport,
            ManagerInfo,
            ReconcileOutcome,
            RefuseOutcome,
            SyncReport,
            WebhookKind,
            WebhookOutcome,
        },
    },
    db_types::{
        ApplicationId,
        BankSnapshot,
        CreditProvider,
        CrmOrder,
        CrmStatus,
        NewFeedItem,
        NewSentMessage,
        NewStatusEntry,
        OrderId,
        ProductType,
        StatusSource,
        TermsComparison,
        TermsSnapshot,
    },
    status::{LoanProductTable, StatusAdapters},
    traits::{CrmGateway, FeedStore, PartnerMessage, ProviderGateway},
};

/// Courtesy delay between consecutive partner status calls in a batch pass. The partners publish
/// no rate limits, so the loop is sequential and spaced rather than parallel.
const DEFAULT_CHECK_DELAY: Duration = Duration::from_millis(500);
/// Delay between per-order feed rebuild steps, which hit both the CRM and a partner.
const DEFAULT_FEED_DELAY: Duration = Duration::from_millis(200);
/// How close a bank-echoed chat message must be to a recorded outgoing message to inherit its
/// manager attribution.
const MESSAGE_MATCH_WINDOW_SECS: i64 = 60;

const HISTORY_CURSOR_KEY: &str = "last_history_id";
const HISTORY_PAGE_SIZE: u32 = 100;

/// CRM history fields whose user edits are worth mirroring into the application's audit trail.
const TRACKED_HISTORY_FIELDS: [(&str, &str); 4] = [
    ("payments.status", "Статус платежа"),
    ("customFields.credit_sum", "Сумма кредита"),
    ("customFields.credit_term", "Срок кредита"),
    ("customFields.credit_company", "Кредитная компания"),
];

/// `ReconcileApi` drives the status reconciliation loop: it polls the partners for every order
/// with an active application, maps raw statuses into the canonical vocabulary, pushes changes
/// into the CRM, maintains the feed cache, and appends the status history.
pub struct ReconcileApi<C, P, B> {
    crm: C,
    partners: P,
    db: B,
    adapters: StatusAdapters,
    products: LoanProductTable,
    check_delay: Duration,
    feed_delay: Duration,
}

impl<C, P, B> Debug for ReconcileApi<C, P, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconcileApi")
    }
}

impl<C, P, B> ReconcileApi<C, P, B> {
    pub fn new(crm: C, partners: P, db: B) -> Self {
        Self {
            crm,
            partners,
            db,
            adapters: StatusAdapters::default(),
            products: LoanProductTable::default(),
            check_delay: DEFAULT_CHECK_DELAY,
            feed_delay: DEFAULT_FEED_DELAY,
        }
    }

    pub fn with_adapters(mut self, adapters: StatusAdapters) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_products(mut self, products: LoanProductTable) -> Self {
        self.products = products;
        self
    }

    /// Override the inter-call delays. Tests set these to zero.
    pub fn with_delays(mut self, check_delay: Duration, feed_delay: Duration) -> Self {
        self.check_delay = check_delay;
        self.feed_delay = feed_delay;
        self
    }
}

impl<C, P, B> ReconcileApi<C, P, B>
where
    C: CrmGateway,
    P: ProviderGateway,
    B: FeedStore,
{
    /// Reconcile a single order against its partner.
    ///
    /// Returns `Ok(None)` in every "nothing to do" case: order missing, no application yet, the
    /// partner still processing, or a raw status outside the mapping table. None of those mutate
    /// any state. Partner errors propagate to the caller here; the batch pass isolates them.
    pub async fn check_order(&self, order_id: OrderId) -> Result<Option<ReconcileOutcome>, CreditFlowError> {
        let Some(order) = self.crm.fetch_order(order_id).await? else {
            warn!("🔄️ Order {order_id} not found for status check");
            return Ok(None);
        };
        self.check_fetched_order(&order).await
    }

    async fn check_fetched_order(&self, order: &CrmOrder) -> Result<Option<ReconcileOutcome>, CreditFlowError> {
        let order_id = order.id;
        let Some(application_id) = order.application_id.clone() else {
            debug!("🔄️ Order {order_id} has no application ID");
            return Ok(None);
        };
        let provider = order.provider_or_default();
        let adapter = self.adapters.for_provider(provider);

        let Some(snapshot) = self.partners.fetch_status(provider, &application_id).await? else {
            debug!("🔄️ [{application_id}] status not available yet ({provider})");
            return Ok(None);
        };
        let raw_status = snapshot.raw_status.clone();

        let Some(mut crm_status) = adapter.map_status(&raw_status) else {
            warn!("🔄️ Unknown {provider} status '{raw_status}' for order {order_id}");
            return Ok(None);
        };

        // A nominally approved application may still differ from what was requested. Only the
        // plain "Approved" readout carries comparable terms.
        if crm_status == CrmStatus::CreditApproved && raw_status == "Approved" {
            let requested = self.requested_terms(order, provider);
            let approved = self.approved_terms(&snapshot, provider);
            if adapter.conditions_changed(&requested, &approved) {
                crm_status = CrmStatus::ConditionsChanged;
                info!("🔄️ {provider} changed credit conditions for order {order_id} [{application_id}]");
            }
        }

        if let Some(payment) = &order.payment {
            if payment.status.as_deref() != Some(crm_status.as_str()) {
                self.crm
                    .update_payment_status(order_id, &payment.id, crm_status, order.site.as_deref())
                    .await?;
                self.append_history(
                    NewStatusEntry::bank(application_id.clone(), None, raw_status.clone(), StatusSource::Cron),
                )
                .await;
                let mut crm_entry = NewStatusEntry::crm(
                    application_id.clone(),
                    payment.status.clone(),
                    crm_status.as_str(),
                    StatusSource::Cron,
                );
                if crm_status == CrmStatus::ConditionsChanged {
                    crm_entry = crm_entry.with_details("Bank changed conditions");
                }
                self.append_history(crm_entry).await;
                info!(
                    "🔄️ Order {order_id} [{application_id}] updated: bank '{raw_status}' -> crm '{crm_status}'"
                );
            }
        }

        if raw_status == "Approved" && order.payment.as_ref().map(|p| p.is_credit()).unwrap_or(false) {
            self.auto_attach_contracts(order, provider, &application_id).await;
        }

        Ok(Some(ReconcileOutcome {
            order_id,
            application_id,
            bank_status: raw_status.clone(),
            document_status: snapshot.document_status,
            crm_status,
            is_final: adapter.is_final(&raw_status),
        }))
    }

    /// One full pass over every order with an active application.
    ///
    /// Orders are de-duplicated, archived orders are skipped, and the partners are called
    /// sequentially with a fixed delay in between. A failing order is logged and skipped; the
    /// pass always covers the whole set.
    pub async fn check_all_pending(&self) -> Result<CheckSummary, CreditFlowError> {
        info!("🔄️ Starting status check for all pending applications");
        let orders = self.active_orders().await?;
        info!("🔄️ Found {} orders with active applications", orders.len());

        let mut summary = CheckSummary { total: orders.len(), ..Default::default() };
        for order in &orders {
            match self.check_fetched_order(order).await {
                Ok(Some(outcome)) => {
                    if outcome.is_final {
                        summary.finalized += 1;
                    }
                    summary.updated += 1;
                    summary.outcomes.push(outcome);
                },
                Ok(None) => {},
                Err(e) => {
                    error!("🔄️ Failed to check order {}: {e}", order.id);
                },
            }
            tokio::time::sleep(self.check_delay).await;
        }

        info!(
            "🔄️ Status check completed: {} total, {} updated, {} final",
            summary.total, summary.updated, summary.finalized
        );
        Ok(summary)
    }

    /// Rebuild the feed cache from live CRM and partner state, then refresh stale rows and stamp
    /// the sync time.
    ///
    /// Stale rows (cached orders that fell out of the active set) get a CRM-lifecycle-only
    /// refresh: their bank status is deliberately NOT re-fetched, so e.g. an order moving to
    /// "delivered" is reflected without another partner call.
    pub async fn sync_feed(&self) -> Result<SyncReport, CreditFlowError> {
        info!("🔄️ Starting feed sync");
        let orders = self.active_orders().await?;
        let mut active_ids = HashSet::new();
        let mut items = Vec::with_capacity(orders.len());

        for order in &orders {
            match self.build_feed_item(order).await {
                Ok(Some(item)) => {
                    active_ids.insert(item.order_id);
                    items.push(item);
                },
                Ok(None) => {},
                Err(e) => {
                    error!("🔄️ Failed to build feed item for order {}: {e}", order.id);
                },
            }
            tokio::time::sleep(self.feed_delay).await;
        }

        let mut synced = 0;
        for item in &items {
            match self.db.upsert_feed_item(item).await {
                Ok(()) => synced += 1,
                Err(e) => error!("🔄️ Failed to upsert feed item for order {}: {e}", item.order_id),
            }
        }

        let stale_refreshed = self.refresh_stale_items(&active_ids).await;
        self.db.touch_last_sync().await?;
        info!("🔄️ Feed sync completed: {synced} synced, {stale_refreshed} stale rows refreshed");
        Ok(SyncReport { synced, stale_refreshed })
    }

    async fn build_feed_item(&self, order: &CrmOrder) -> Result<Option<NewFeedItem>, CreditFlowError> {
        let Some(application_id) = order.application_id.clone() else {
            return Ok(None);
        };
        let provider = order.provider_or_default();
        let adapter = self.adapters.for_provider(provider);

        let snapshot = match self.partners.fetch_status(provider, &application_id).await {
            Ok(s) => s,
            Err(e) => {
                error!("🔄️ Could not fetch {provider} status for [{application_id}]: {e}");
                None
            },
        };

        let requested = self.requested_terms(order, provider);
        let mut comparison = TermsComparison { requested, approved: None };
        let mut conditions_changed = false;
        let (bank_status, document_status) = match &snapshot {
            Some(s) => {
                if s.raw_status == "Approved" {
                    let approved = self.approved_terms(s, provider);
                    conditions_changed = adapter.conditions_changed(&requested, &approved);
                    comparison.approved = Some(approved);
                }
                (s.raw_status.clone(), s.document_status.clone())
            },
            None => ("Unknown".to_string(), None),
        };

        let manager_name = match order.manager_id {
            Some(id) => self.crm.manager_name(id).await.ok().flatten(),
            None => None,
        };

        Ok(Some(NewFeedItem {
            order_id: order.id,
            order_number: order.number.clone(),
            application_id,
            credit_company: provider,
            customer_name: order.customer_name(),
            bank_status,
            document_status,
            crm_status: order.payment.as_ref().and_then(|p| p.status.clone()),
            payment_type: order.payment.as_ref().map(|p| p.kind.clone()),
            order_status: order.status.clone(),
            manager_id: order.manager_id,
            manager_name,
            conditions_changed,
            comparison: Some(comparison),
            order_created_at: order.created_at,
        }))
    }

    /// Re-check only the CRM lifecycle state of cached rows that are no longer in the active
    /// set. Returns the number of rows actually updated.
    async fn refresh_stale_items(&self, active_ids: &HashSet<OrderId>) -> usize {
        let existing = match self.db.feed_items(&FeedQueryFilter::default().archived(false)).await {
            Ok(items) => items,
            Err(e) => {
                error!("🔄️ Could not load cached feed for the stale pass: {e}");
                return 0;
            },
        };
        let mut refreshed = 0;
        for stale in existing.iter().filter(|item| !active_ids.contains(&item.order_id)) {
            match self.crm.fetch_order(stale.order_id).await {
                Ok(Some(order)) if order.status != stale.order_status => {
                    let mut updated = NewFeedItem::from(stale);
                    updated.order_status = order.status.clone();
                    if let Some(status) = order.payment.as_ref().and_then(|p| p.status.clone()) {
                        updated.crm_status = Some(status);
                    }
                    match self.db.upsert_feed_item(&updated).await {
                        Ok(()) => {
                            refreshed += 1;
                            debug!(
                                "🔄️ Stale order {} moved {:?} -> {:?}",
                                stale.order_id, stale.order_status, order.status
                            );
                        },
                        Err(e) => warn!("🔄️ Failed to update stale item {}: {e}", stale.order_id),
                    }
                },
                Ok(_) => {},
                Err(e) => warn!("🔄️ Failed to re-check stale order {}: {e}", stale.order_id),
            }
        }
        refreshed
    }

    /// Mirror user-made CRM edits of the credit fields into the status history, so the audit
    /// trail shows who changed what between bank transitions.
    pub async fn sync_crm_history(&self) -> Result<HistorySyncReport, CreditFlowError> {
        let cursor = match self.db.metadata(HISTORY_CURSOR_KEY).await? {
            Some(v) => v.parse::<i64>().ok(),
            None => None,
        };
        let changes = self.crm.history_since(cursor, HISTORY_PAGE_SIZE).await?;
        if changes.is_empty() {
            return Ok(HistorySyncReport::default());
        }

        let mut report = HistorySyncReport::default();
        let mut max_id = cursor.unwrap_or(0);
        for change in &changes {
            if change.id > max_id {
                max_id = change.id;
            }
            if change.source.as_deref() != Some("user") {
                continue;
            }
            let Some(field) = change.field.as_deref() else { continue };
            let Some((_, label)) = TRACKED_HISTORY_FIELDS.iter().find(|(f, _)| field.starts_with(f)) else {
                continue;
            };
            let Some(order_id) = change.order_id else { continue };
            report.processed += 1;

            let result: Result<bool, CreditFlowError> = async {
                let Some(order) = self.crm.fetch_order(order_id).await? else { return Ok(false) };
                let Some(application_id) = order.application_id else { return Ok(false) };
                let manager_name = match change.user_id {
                    Some(id) => self.crm.manager_name(id).await.ok().flatten(),
                    None => None,
                };
                let details = format!(
                    "{label}: {} -> {}",
                    change.old_value.as_deref().unwrap_or("-"),
                    change.new_value.as_deref().unwrap_or("-")
                );
                let entry = NewStatusEntry::crm(
                    application_id,
                    Some(change.old_value.clone().unwrap_or_default()),
                    change.new_value.clone().unwrap_or_default(),
                    StatusSource::User,
                )
                .with_details(details)
                .with_manager(change.user_id, manager_name);
                self.db.append_status_history(&entry).await?;
                Ok(true)
            }
            .await;
            match result {
                Ok(true) => report.saved += 1,
                Ok(false) => {},
                Err(e) => error!("🔄️ Failed to process history change {}: {e}", change.id),
            }
        }

        if max_id > cursor.unwrap_or(0) {
            self.db.set_metadata(HISTORY_CURSOR_KEY, &max_id.to_string()).await?;
        }
        if report.saved > 0 {
            info!("🔄️ CRM history sync: {} processed, {} saved", report.processed, report.saved);
        }
        Ok(report)
    }

    /// Apply an Iute webhook event: the partner confirms (credit issued) or cancels the order.
    pub async fn apply_webhook(
        &self,
        application_id: &ApplicationId,
        kind: WebhookKind,
        description: Option<String>,
    ) -> Result<WebhookOutcome, CreditFlowError> {
        info!("🪝️ Processing {} webhook for [{application_id}]", kind.bank_status());
        let item = self
            .db
            .feed_item_by_application(application_id)
            .await?
            .ok_or_else(|| CreditFlowError::UnknownApplication(application_id.clone()))?;

        let new_status = kind.bank_status();
        let crm_status = self.adapters.for_provider(CreditProvider::Iute).map_status(new_status);
        self.db
            .update_application_status(application_id, new_status, crm_status.map(|s| s.as_str()))
            .await?;

        if let Some(crm_status) = crm_status {
            if let Some(order) = self.crm.fetch_order(item.order_id).await? {
                if let Some(payment) = &order.payment {
                    self.crm
                        .update_payment_status(order.id, &payment.id, crm_status, order.site.as_deref())
                        .await?;
                }
            }
        }

        let entry = NewStatusEntry::bank(
            application_id.clone(),
            Some(item.bank_status.clone()),
            new_status,
            StatusSource::Webhook,
        )
        .with_details(description.unwrap_or_else(|| kind.default_details().to_string()));
        self.append_history(entry).await;

        info!("🪝️ Webhook processed: [{application_id}] {} -> {new_status}", item.bank_status);
        Ok(WebhookOutcome { application_id: application_id.clone(), status: new_status.to_string() })
    }

    /// Push the order's attachments (typically signed contracts) to its credit partner.
    pub async fn send_files_to_bank(&self, order_id: OrderId) -> Result<FilesOutcome, CreditFlowError> {
        info!("📤️ Sending files to bank for order {order_id}");
        let (order, application_id) = self.order_with_application(order_id).await?;
        let files = self.crm.order_files(order_id, order.site.as_deref()).await?;
        if files.is_empty() {
            return Err(CreditFlowError::Validation(format!("Order {order_id} has no files attached")));
        }
        let provider = order.provider_or_default();
        self.partners.upload_files(provider, &application_id, &files).await?;
        info!("📤️ {} files sent to {provider} for [{application_id}]", files.len());
        Ok(FilesOutcome { order_id, application_id, credit_company: provider, files_count: files.len() })
    }

    /// Fetch the application's contract documents for download, attaching them to the order on
    /// the way when it does not hold contract files yet.
    pub async fn contracts_for_download(&self, order_id: OrderId) -> Result<ContractsOutcome, CreditFlowError> {
        info!("📤️ Getting contracts for order {order_id}");
        let (order, application_id) = self.order_with_application(order_id).await?;
        let provider = order.provider_or_default();
        let files = self.partners.fetch_contracts(provider, &application_id).await?;
        if files.is_empty() {
            let message = match provider {
                CreditProvider::EasyCredit => "Контракт пока недоступен. Заявка должна быть одобрена.",
                _ => "No contracts available for this application",
            };
            return Err(CreditFlowError::Validation(message.to_string()));
        }

        match self.crm.has_contract_files(order_id, order.site.as_deref()).await {
            Ok(true) => {},
            Ok(false) => {
                for file in &files {
                    if let Err(e) = self
                        .crm
                        .upload_file(order_id, &file.name, &file.data, order.site.as_deref())
                        .await
                    {
                        error!("📤️ Failed to attach contract {} to order {order_id}: {e}", file.name);
                    }
                }
            },
            Err(e) => warn!("📤️ Could not check existing contract files on order {order_id}: {e}"),
        }

        info!("📤️ {} contracts ready for download for [{application_id}]", files.len());
        Ok(ContractsOutcome { order_id, application_id, files })
    }

    /// Withdraw the application at the partner and decline the CRM payment.
    pub async fn refuse_application(
        &self,
        order_id: OrderId,
        reason: Option<String>,
        manager: &ManagerInfo,
    ) -> Result<RefuseOutcome, CreditFlowError> {
        info!("🛑️ Refusing application for order {order_id}");
        let (order, application_id) = self.order_with_application(order_id).await?;
        let provider = order.provider_or_default();
        self.partners.refuse_application(provider, &application_id, reason.as_deref()).await?;

        if let Some(payment) = &order.payment {
            self.crm
                .update_payment_status(order_id, &payment.id, CrmStatus::CreditDeclined, order.site.as_deref())
                .await?;
            let details = match &reason {
                Some(r) => format!("Refused: {r}"),
                None => "Application cancelled".to_string(),
            };
            let entry = NewStatusEntry::crm(
                application_id.clone(),
                payment.status.clone(),
                CrmStatus::CreditDeclined.as_str(),
                StatusSource::Api,
            )
            .with_details(details)
            .with_manager(manager.manager_id, manager.manager_name.clone());
            self.append_history(entry).await;
        }

        info!("🛑️ Application [{application_id}] refused at {provider}");
        Ok(RefuseOutcome { order_id, application_id })
    }

    /// Messages from the partner's application chat, with manager attribution restored for
    /// messages this system sent.
    pub async fn get_messages(
        &self,
        order_id: OrderId,
        new_only: bool,
    ) -> Result<Vec<PartnerMessage>, CreditFlowError> {
        let (order, application_id) = self.order_with_application(order_id).await?;
        let provider = order.provider_or_default();
        let mut messages = self.partners.fetch_messages(provider, &application_id, new_only).await?;
        if provider == CreditProvider::Microinvest {
            let sent = self.db.sent_messages(&application_id).await.unwrap_or_else(|e| {
                warn!("💬️ Could not load sent-message attributions for [{application_id}]: {e}");
                Vec::new()
            });
            for message in &mut messages {
                // Partner-side sender ids for our own relayed messages carry the partner prefix;
                // match them back to the recorded outgoing message to restore the author.
                if message.sender_id.as_deref().map(|s| s.starts_with("PAN")).unwrap_or(false) {
                    if let Some(record) = sent.iter().find(|s| {
                        s.message_text == message.text && message_dates_match(&s.sent_at, message.date.as_deref())
                    }) {
                        message.manager_id = record.manager_id;
                        message.manager_name = record.manager_name.clone();
                    }
                }
            }
        }
        Ok(messages)
    }

    /// Relay a manager's message into the partner chat, optionally with the order's attachments.
    pub async fn send_message(
        &self,
        order_id: OrderId,
        text: &str,
        with_files: bool,
        manager: &ManagerInfo,
    ) -> Result<FilesOutcome, CreditFlowError> {
        info!("💬️ Sending message for order {order_id}");
        let (order, application_id) = self.order_with_application(order_id).await?;
        let provider = order.provider_or_default();
        if provider == CreditProvider::EasyCredit {
            return Err(CreditFlowError::Validation(
                "Easy Credit не поддерживает отправку сообщений. Банк отправляет комментарии в одностороннем порядке."
                    .to_string(),
            ));
        }

        let files = if with_files {
            let files = self.crm.order_files(order_id, order.site.as_deref()).await?;
            if files.is_empty() {
                return Err(CreditFlowError::Validation("Нет файлов для отправки".to_string()));
            }
            Some(files)
        } else {
            None
        };
        self.partners
            .send_message(provider, &application_id, text, files.as_deref())
            .await?;

        if manager.manager_id.is_some() || manager.manager_name.is_some() {
            let record = NewSentMessage {
                application_id: application_id.clone(),
                message_text: text.to_string(),
                manager_id: manager.manager_id,
                manager_name: manager.manager_name.clone(),
            };
            if let Err(e) = self.db.save_sent_message(&record).await {
                error!("💬️ Failed to save message sender info for [{application_id}]: {e}");
            }
        }

        Ok(FilesOutcome {
            order_id,
            application_id,
            credit_company: provider,
            files_count: files.map(|f| f.len()).unwrap_or(0),
        })
    }

    /// Move the CRM order itself (not the payment) to a new lifecycle status.
    pub async fn set_order_status(&self, order_id: OrderId, status: &str) -> Result<(), CreditFlowError> {
        info!("🔄️ Updating order {order_id} status to '{status}'");
        let order = self
            .crm
            .fetch_order(order_id)
            .await?
            .ok_or(CreditFlowError::OrderNotFound(order_id))?;
        self.crm.update_order_status(order_id, status, order.site.as_deref()).await?;
        Ok(())
    }

    //------------------------------------------ internals ------------------------------------------

    async fn active_orders(&self) -> Result<Vec<CrmOrder>, CreditFlowError> {
        let orders = self.crm.orders_with_active_applications().await?;
        let mut seen = HashSet::new();
        let filtered = orders
            .into_iter()
            .filter(|order| order.application_id.is_some())
            .filter(|order| {
                if order.is_archived() {
                    debug!("🔄️ Skipping archived order {} ({:?})", order.id, order.status);
                    return false;
                }
                true
            })
            .filter(|order| seen.insert(order.id))
            .collect();
        Ok(filtered)
    }

    async fn order_with_application(
        &self,
        order_id: OrderId,
    ) -> Result<(CrmOrder, ApplicationId), CreditFlowError> {
        let order = self
            .crm
            .fetch_order(order_id)
            .await?
            .ok_or(CreditFlowError::OrderNotFound(order_id))?;
        let application_id = order
            .application_id
            .clone()
            .ok_or(CreditFlowError::NoApplication(order_id))?;
        Ok((order, application_id))
    }

    fn requested_terms(&self, order: &CrmOrder, provider: CreditProvider) -> TermsSnapshot {
        let product_type = match provider {
            CreditProvider::Microinvest => {
                self.products.requested_product_type(order.zero_interest, order.credit_term_months())
            },
            _ => ProductType::Retail,
        };
        TermsSnapshot::new(order.requested_amount(), order.credit_term_months(), product_type)
    }

    fn approved_terms(&self, snapshot: &BankSnapshot, provider: CreditProvider) -> TermsSnapshot {
        let product_type = match provider {
            CreditProvider::Microinvest => snapshot
                .approved_product_id
                .as_deref()
                .map(|id| self.products.product_type_for_id(id))
                .unwrap_or(ProductType::Retail),
            _ => ProductType::Retail,
        };
        TermsSnapshot::new(
            snapshot.approved_amount.unwrap_or_default(),
            snapshot.approved_term.unwrap_or(0),
            product_type,
        )
    }

    /// Contract auto-attach is best-effort and idempotent: nothing is fetched when the order
    /// already carries contract-like files, and failures never surface to the reconcile flow.
    async fn auto_attach_contracts(&self, order: &CrmOrder, provider: CreditProvider, application_id: &ApplicationId) {
        let result: Result<(), CreditFlowError> = async {
            if self.crm.has_contract_files(order.id, order.site.as_deref()).await? {
                debug!("📎️ Contracts already attached to order {}", order.id);
                return Ok(());
            }
            let contracts = self.partners.fetch_contracts(provider, application_id).await?;
            if contracts.is_empty() {
                debug!("📎️ No contracts available yet for [{application_id}]");
                return Ok(());
            }
            for file in contracts {
                let name = if file.name.is_empty() {
                    format!("contract_{application_id}.pdf")
                } else {
                    file.name.clone()
                };
                self.crm
                    .upload_file(order.id, &name, &file.data, order.site.as_deref())
                    .await?;
                info!("📎️ Contract '{name}' auto-attached to order {}", order.id);
            }
            Ok(())
        }
        .await;
        if let Err(e) = result {
            error!("📎️ Auto-attach contracts failed for order {} [{application_id}]: {e}", order.id);
        }
    }

    async fn append_history(&self, entry: NewStatusEntry) {
        if let Err(e) = self.db.append_status_history(&entry).await {
            error!("🗃️ Failed to save status history for [{}]: {e}", entry.application_id);
        }
    }
}

/// True when a bank-echoed message date is within the attribution window of the recorded send
/// time. Unparsable dates never match.
fn message_dates_match(sent_at: &DateTime<Utc>, message_date: Option<&str>) -> bool {
    let Some(raw) = message_date else { return false };
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|naive| naive.and_utc())
        });
    match parsed {
        Ok(date) => (date - *sent_at).num_seconds().abs() <= MESSAGE_MATCH_WINDOW_SECS,
        Err(_) => false,
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn message_date_matching_window() {
        let sent = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(message_dates_match(&sent, Some("2024-05-01 12:00:30")));
        assert!(message_dates_match(&sent, Some("2024-05-01T11:59:10+00:00")));
        assert!(!message_dates_match(&sent, Some("2024-05-01 12:02:00")));
        assert!(!message_dates_match(&sent, Some("not a date")));
        assert!(!message_dates_match(&sent, None));
    }
}
