//! Watermark-based incremental reconciliation for one account.

use crate::datasource::DataSource;
use crate::db::TradeStore;
use crate::domain::{sort_fills_deterministic, Address, Decimal, Fill, TimeMs};
use crate::engine::PositionLedger;
use crate::orchestration::observer::LedgerObserver;
use crate::reconcile::{CycleReport, ReconcileError};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Turns the venue's fill set into new ledger rows.
///
/// Each fill is one unit: classify, apply, compute, append. The in-memory
/// accumulator state only advances after its row is stored.
#[derive(Clone)]
pub struct Reconciler {
    datasource: Arc<dyn DataSource>,
    store: Arc<dyn TradeStore>,
    bot_fee_bps: Decimal,
    observers: Vec<Arc<dyn LedgerObserver>>,
}

impl Reconciler {
    pub fn new(
        datasource: Arc<dyn DataSource>,
        store: Arc<dyn TradeStore>,
        bot_fee_bps: Decimal,
    ) -> Self {
        Self {
            datasource,
            store,
            bot_fee_bps,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LedgerObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Run one cycle for `account`.
    ///
    /// Feed failures abort the cycle before anything is written. A store write
    /// failure stops the cycle so the failed fill and everything after it stay
    /// at or above the watermark for the next cycle. Shutdown is honoured
    /// between fill units only.
    pub async fn reconcile_account(
        &self,
        account: &Address,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<CycleReport, ReconcileError> {
        let mut report = CycleReport::new(account.clone());

        let watermark = self.store.max_timestamp(account).await?.unwrap_or_default();
        let fills = self.datasource.fetch_fills(account).await?;
        report.fetched = fills.len();

        let candidates: Vec<Fill> = fills
            .into_iter()
            .filter(|f| f.time_ms >= watermark)
            .collect();
        report.candidates = candidates.len();

        let mut fresh = self.filter_new(account, watermark, candidates, &mut report).await?;
        sort_fills_deterministic(&mut fresh);

        debug!(
            account = %account,
            watermark = watermark.as_ms(),
            fetched = report.fetched,
            candidates = report.candidates,
            new = fresh.len(),
            "Reconciling"
        );

        let mut ledger = PositionLedger::new(account.clone(), self.bot_fee_bps);
        let total = fresh.len();

        for (index, fill) in fresh.iter().enumerate() {
            if *shutdown.borrow() {
                report.deferred = total - index;
                info!(
                    account = %account,
                    deferred = report.deferred,
                    "Shutdown requested, stopping between fills"
                );
                break;
            }

            if ledger.state(&fill.coin).is_none() {
                match self.store.latest_accumulator_state(account, &fill.coin).await {
                    Ok(state) => ledger.seed(fill.coin.clone(), state.unwrap_or_default()),
                    Err(e) => {
                        error!(account = %account, coin = %fill.coin, error = %e, fill = ?fill, "Failed to load ledger state");
                        report.deferred = total - index;
                        break;
                    }
                }
            }

            let entry = match ledger.prepare(fill) {
                Ok(entry) => entry,
                Err(e) => {
                    error!(account = %account, error = %e, fill = ?fill, "Skipping fill");
                    report.failed += 1;
                    continue;
                }
            };

            match self.store.append_if_absent(&entry).await {
                Ok(true) => {
                    ledger.commit(&entry);
                    report.applied += 1;
                    for observer in &self.observers {
                        observer.on_entry(&entry);
                    }
                }
                Ok(false) => {
                    // Written by someone else since the dedup check; reload the coin's state.
                    debug!(account = %account, oid = fill.oid, "Fill already stored");
                    report.duplicates += 1;
                    ledger.forget(&fill.coin);
                }
                Err(e) => {
                    error!(account = %account, error = %e, fill = ?fill, "Failed to store ledger entry");
                    report.failed += 1;
                    report.deferred = total - index - 1;
                    break;
                }
            }
        }

        for observer in &self.observers {
            observer.on_cycle(&report);
        }
        Ok(report)
    }

    /// Drop candidates already stored for the account and repeats within the batch.
    async fn filter_new(
        &self,
        account: &Address,
        watermark: TimeMs,
        candidates: Vec<Fill>,
        report: &mut CycleReport,
    ) -> Result<Vec<Fill>, ReconcileError> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let mut seen = self.store.existing_dedup_keys(account, watermark).await?;
        let mut fresh = Vec::with_capacity(candidates.len());
        for fill in candidates {
            if seen.insert(fill.dedup_key().digest()) {
                fresh.push(fill);
            } else {
                report.duplicates += 1;
            }
        }

        if report.duplicates > 0 {
            debug!(account = %account, duplicates = report.duplicates, "Skipped known fills");
        }
        if fresh.is_empty() && report.candidates > 0 {
            debug!(account = %account, "No new fills");
        }
        Ok(fresh)
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("datasource", &self.datasource)
            .field("bot_fee_bps", &self.bot_fee_bps)
            .field("observers", &self.observers.len())
            .finish()
    }
}
