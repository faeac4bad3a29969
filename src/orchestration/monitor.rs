//! Periodic reconciliation of every monitored account.

use crate::domain::Address;
use crate::reconcile::{CycleReport, Reconciler};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Result of one tick across all accounts.
#[derive(Debug, Default)]
pub struct MonitorCycle {
    pub reports: Vec<CycleReport>,
    /// Accounts whose cycle aborted (feed or store unavailable).
    pub failed_accounts: Vec<Address>,
}

impl MonitorCycle {
    pub fn total_applied(&self) -> usize {
        self.reports.iter().map(|r| r.applied).sum()
    }
}

/// Drives the reconciler on a fixed interval until shutdown.
///
/// Accounts run concurrently within a tick and the tick is joined before the
/// next one starts, so cycles for one account never overlap.
#[derive(Debug, Clone)]
pub struct Monitor {
    reconciler: Arc<Reconciler>,
    accounts: Vec<Address>,
    interval: Duration,
}

impl Monitor {
    pub fn new(reconciler: Arc<Reconciler>, accounts: Vec<Address>, interval: Duration) -> Self {
        Self {
            reconciler,
            accounts,
            interval,
        }
    }

    pub fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> MonitorCycle {
        let results = join_all(
            self.accounts
                .iter()
                .map(|account| self.reconciler.reconcile_account(account, shutdown)),
        )
        .await;

        let mut cycle = MonitorCycle::default();
        for (account, result) in self.accounts.iter().zip(results) {
            match result {
                Ok(report) => cycle.reports.push(report),
                Err(e) => {
                    error!(account = %account, error = %e, "Account cycle failed, retrying next interval");
                    cycle.failed_accounts.push(account.clone());
                }
            }
        }

        let applied = cycle.total_applied();
        if applied > 0 {
            info!(
                applied,
                accounts = self.accounts.len(),
                "New trades recorded"
            );
        }
        cycle
    }

    /// Run until the shutdown flag flips to `true` or its sender is dropped.
    ///
    /// The first cycle starts immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            accounts = self.accounts.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Monitoring started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle(&shutdown).await;
                    if *shutdown.borrow() {
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Monitoring stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{DataSourceError, MockDataSource};
    use crate::db::{init_db, Repository, TradeStore};
    use crate::domain::{Coin, Decimal, Fill, Side, TimeMs};
    use tempfile::TempDir;

    fn open_fill(oid: i64) -> Fill {
        Fill {
            oid,
            tid: None,
            coin: Coin::new("ETH".to_string()),
            time_ms: TimeMs::new(1_000 + oid),
            px: Decimal::from(2000),
            sz: Decimal::one(),
            side: Side::Buy,
            start_position: Decimal::from(oid - 1),
            closed_pnl: Decimal::zero(),
            fee: Decimal::from_str_canonical("0.5").unwrap(),
            dir: None,
            liquidation: None,
        }
    }

    async fn setup(
        accounts: &[Address],
        mock: Arc<MockDataSource>,
    ) -> (Monitor, Arc<Repository>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let repo = Arc::new(Repository::new(pool));
        let reconciler = Reconciler::new(mock, repo.clone(), Decimal::from(5));
        let monitor = Monitor::new(
            Arc::new(reconciler),
            accounts.to_vec(),
            Duration::from_millis(10),
        );
        (monitor, repo, temp_dir)
    }

    #[tokio::test]
    async fn test_run_cycle_covers_all_accounts() {
        let a = Address::new("0xaaa".to_string());
        let b = Address::new("0xbbb".to_string());
        let mock = Arc::new(
            MockDataSource::new()
                .with_fills(&a, vec![open_fill(1), open_fill(2)])
                .with_fill(&b, open_fill(1)),
        );
        let (monitor, repo, _temp) = setup(&[a.clone(), b.clone()], mock).await;
        let (_tx, rx) = watch::channel(false);

        let cycle = monitor.run_cycle(&rx).await;
        assert_eq!(cycle.total_applied(), 3);
        assert!(cycle.failed_accounts.is_empty());
        assert_eq!(repo.entries(&a, None, None, None).await.unwrap().len(), 2);
        assert_eq!(repo.entries(&b, None, None, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_feed_failure_is_reported_per_account() {
        let a = Address::new("0xaaa".to_string());
        let mock = Arc::new(MockDataSource::new().with_fill(&a, open_fill(1)));
        mock.set_failure(Some(DataSourceError::RateLimited)).unwrap();
        let (monitor, repo, _temp) = setup(&[a.clone()], mock.clone()).await;
        let (_tx, rx) = watch::channel(false);

        let cycle = monitor.run_cycle(&rx).await;
        assert_eq!(cycle.failed_accounts, vec![a.clone()]);
        assert!(repo.max_timestamp(&a).await.unwrap().is_none());

        mock.set_failure(None).unwrap();
        let cycle = monitor.run_cycle(&rx).await;
        assert_eq!(cycle.total_applied(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let a = Address::new("0xaaa".to_string());
        let mock = Arc::new(MockDataSource::new().with_fill(&a, open_fill(1)));
        let (monitor, repo, _temp) = setup(&[a.clone()], mock).await;
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { monitor.run(rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();

        assert_eq!(repo.entries(&a, None, None, None).await.unwrap().len(), 1);
    }
}
