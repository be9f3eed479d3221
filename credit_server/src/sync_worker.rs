//! The scheduled reconciliation worker.
//!
//! A single spawned task runs the full pass (status check, feed sync, CRM history sync) on a
//! fixed interval. The pass itself is exposed as [`run_sync_pass`] so it can be exercised
//! directly without any timer in the way.

use std::time::Duration;

use credit_engine::{
    traits::{CrmGateway, FeedStore, ProviderGateway},
    ReconcileApi,
};
use log::*;
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

use crate::routes::Reconciler;

/// One full reconciliation pass. Each stage is error-isolated: a failing stage is logged and the
/// remaining stages still run.
pub async fn run_sync_pass<C, P, B>(api: &ReconcileApi<C, P, B>)
where
    C: CrmGateway,
    P: ProviderGateway,
    B: FeedStore,
{
    match api.check_all_pending().await {
        Ok(summary) => {
            info!(
                "🕰️ Status pass: {} orders, {} updated, {} final",
                summary.total, summary.updated, summary.finalized
            );
        },
        Err(e) => error!("🕰️ Status pass failed: {e}"),
    }
    match api.sync_feed().await {
        Ok(report) => info!("🕰️ Feed sync: {} rows, {} stale refreshed", report.synced, report.stale_refreshed),
        Err(e) => error!("🕰️ Feed sync failed: {e}"),
    }
    match api.sync_crm_history().await {
        Ok(report) => {
            if report.saved > 0 {
                info!("🕰️ CRM history sync: {} saved", report.saved);
            }
        },
        Err(e) => error!("🕰️ CRM history sync failed: {e}"),
    }
}

/// Starts the sync worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// An initial feed sync runs after a short startup delay so the cached feed is warm without
/// hammering the partners while the server is still coming up. Ticks that fire while a pass is
/// still in flight are skipped, not queued: the pass is idempotent and the next tick catches up.
///
/// Takes the concrete reconciler rather than a generic one so the spawned future's `Send`-ness
/// is provable; [`run_sync_pass`] stays generic for tests.
pub fn start_sync_worker(api: Reconciler, every: Duration, initial_delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(initial_delay).await;
        info!("🕰️ Running initial feed sync");
        match api.sync_feed().await {
            Ok(report) => info!("🕰️ Initial feed sync completed: {} rows", report.synced),
            Err(e) => error!("🕰️ Initial feed sync failed: {e}"),
        }

        let mut timer = interval_at(Instant::now() + every, every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("🕰️ Status sync worker started, interval {every:?}");
        loop {
            timer.tick().await;
            info!("🕰️ Scheduled reconciliation pass starting");
            run_sync_pass(&api).await;
        }
    })
}
