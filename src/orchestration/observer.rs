//! Collaborators notified of new ledger rows and finished cycles.

use crate::domain::{Decimal, LedgerEntry};
use crate::reconcile::CycleReport;
use tracing::{info, warn};

/// Net PnL below this is reported as a loss.
pub const NEGATIVE_PNL_THRESHOLD: Decimal = Decimal::from_parts(-1, 8);

/// Receives every appended ledger row and every cycle report.
///
/// Called inline by the reconciler, so implementations should return quickly.
pub trait LedgerObserver: Send + Sync {
    fn on_entry(&self, entry: &LedgerEntry);

    fn on_cycle(&self, _report: &CycleReport) {}
}

/// Writes ledger activity to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl LogObserver {
    pub fn is_loss(entry: &LedgerEntry) -> bool {
        entry.direction.is_pnl_eligible() && entry.net_pnl < NEGATIVE_PNL_THRESHOLD
    }
}

impl LedgerObserver for LogObserver {
    fn on_entry(&self, entry: &LedgerEntry) {
        let fill = &entry.fill;
        info!(
            account = %entry.account.short(),
            coin = %fill.coin,
            direction = %entry.direction,
            sz = %fill.sz,
            px = %fill.px,
            closed_pnl = %fill.closed_pnl,
            net_pnl = %entry.net_pnl,
            time = %fill.time_ms,
            oid = fill.oid,
            "Trade recorded"
        );

        if Self::is_loss(entry) {
            warn!(
                account = %entry.account.short(),
                coin = %fill.coin,
                direction = %entry.direction,
                closed_pnl = %fill.closed_pnl,
                net_pnl = %entry.net_pnl,
                oid = fill.oid,
                "Negative net PnL"
            );
        }
    }

    fn on_cycle(&self, report: &CycleReport) {
        if report.applied > 0 || report.failed > 0 {
            info!(
                account = %report.account.short(),
                fetched = report.fetched,
                applied = report.applied,
                duplicates = report.duplicates,
                failed = report.failed,
                deferred = report.deferred,
                "Cycle finished"
            );
        }
    }
}
