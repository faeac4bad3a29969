use async_trait::async_trait;
use netledger::datasource::MockDataSource;
use netledger::db::{init_db, CoinState, StoreError, SumField, TradeStore};
use netledger::domain::{
    AccumulatorState, Address, Coin, Decimal, Fill, LedgerEntry, Side, TimeMs,
};
use netledger::{ReconcileError, Reconciler, Repository};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn account() -> Address {
    Address::new("0x00000000000000000000000000000000000000b2".to_string())
}

#[allow(clippy::too_many_arguments)]
fn fill(
    oid: i64,
    coin: &str,
    time_ms: i64,
    side: Side,
    sz: &str,
    start: &str,
    fee: &str,
    closed_pnl: &str,
) -> Fill {
    Fill {
        oid,
        tid: Some(oid * 100),
        coin: Coin::new(coin.to_string()),
        time_ms: TimeMs::new(time_ms),
        px: d("100"),
        sz: d(sz),
        side,
        start_position: d(start),
        closed_pnl: d(closed_pnl),
        fee: d(fee),
        dir: None,
        liquidation: None,
    }
}

/// Open, partial close, flip and close on BTC plus an ETH round trip.
fn history() -> Vec<Fill> {
    vec![
        fill(1, "BTC", 1000, Side::Buy, "10", "0", "1", "0"),
        fill(2, "ETH", 1500, Side::Sell, "4", "0", "0.4", "0"),
        fill(3, "BTC", 2000, Side::Sell, "4", "10", "0.4", "8"),
        fill(4, "BTC", 3000, Side::Sell, "9", "6", "0.9", "12"),
        fill(5, "ETH", 3500, Side::Buy, "4", "-4", "0.4", "-2"),
        fill(6, "BTC", 4000, Side::Buy, "3", "-3", "0.3", "1"),
    ]
}

async fn setup_repo() -> (Arc<Repository>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    (Arc::new(Repository::new(pool)), temp_dir)
}

async fn run_once(reconciler: &Reconciler) -> Result<netledger::CycleReport, ReconcileError> {
    let (_tx, rx) = watch::channel(false);
    reconciler.reconcile_account(&account(), &rx).await
}

/// Comparable view of a ledger, independent of row ids.
fn snapshot(entries: &[LedgerEntry]) -> Vec<(i64, String, String, String, AccumulatorState)> {
    entries
        .iter()
        .map(|e| {
            (
                e.fill.oid,
                e.direction.label(),
                e.realized_fee.to_canonical_string(),
                e.net_pnl.to_canonical_string(),
                e.state,
            )
        })
        .collect()
}

#[tokio::test]
async fn test_full_history_reconciles() {
    let (repo, _temp) = setup_repo().await;
    let mock = Arc::new(MockDataSource::new().with_fills(&account(), history()));
    let reconciler = Reconciler::new(mock, repo.clone(), Decimal::zero());

    let report = run_once(&reconciler).await.unwrap();
    assert_eq!(report.applied, 6);
    assert_eq!(report.failed, 0);

    let entries = repo.entries(&account(), None, None, None).await.unwrap();
    let labels: Vec<String> = entries.iter().map(|e| e.direction.label()).collect();
    assert_eq!(
        labels,
        vec![
            "Open Long",
            "Open Short",
            "Decrease Long",
            "Close Long + Open Short",
            "Close Short",
            "Close Short",
        ]
    );

    let btc = repo
        .latest_accumulator_state(&account(), &Coin::new("BTC".to_string()))
        .await
        .unwrap()
        .unwrap();
    assert!(btc.is_flat());
    assert_eq!(btc.open_long, btc.close_long);
    assert_eq!(btc.open_short, btc.close_short);
    assert!(btc.fee_reserve_long.is_zero());
    assert!(btc.fee_reserve_short.is_zero());

    assert!(repo.latest_states(&account()).await.unwrap().iter().all(|s| s.state.is_flat()));
}

#[tokio::test]
async fn test_rerun_without_new_fills_is_noop() {
    let (repo, _temp) = setup_repo().await;
    let mock = Arc::new(MockDataSource::new().with_fills(&account(), history()));
    let reconciler = Reconciler::new(mock, repo.clone(), d("5"));

    run_once(&reconciler).await.unwrap();
    let net_before = repo
        .sum_field(&account(), SumField::NetPnl, None)
        .await
        .unwrap();
    let rows_before = repo.entries(&account(), None, None, None).await.unwrap();

    let report = run_once(&reconciler).await.unwrap();
    assert_eq!(report.applied, 0);

    let net_after = repo
        .sum_field(&account(), SumField::NetPnl, None)
        .await
        .unwrap();
    assert_eq!(net_before, net_after);
    assert_eq!(
        rows_before.len(),
        repo.entries(&account(), None, None, None).await.unwrap().len()
    );
}

#[tokio::test]
async fn test_feed_order_does_not_matter() {
    let (repo_sorted, _t1) = setup_repo().await;
    let (repo_shuffled, _t2) = setup_repo().await;

    let mut shuffled = history();
    shuffled.reverse();
    shuffled.swap(0, 3);

    let sorted_mock = Arc::new(MockDataSource::new().with_fills(&account(), history()));
    let shuffled_mock = Arc::new(MockDataSource::new().with_fills(&account(), shuffled));

    run_once(&Reconciler::new(sorted_mock, repo_sorted.clone(), d("5")))
        .await
        .unwrap();
    run_once(&Reconciler::new(shuffled_mock, repo_shuffled.clone(), d("5")))
        .await
        .unwrap();

    let a = repo_sorted.entries(&account(), None, None, None).await.unwrap();
    let b = repo_shuffled
        .entries(&account(), None, None, None)
        .await
        .unwrap();
    assert_eq!(snapshot(&a), snapshot(&b));
}

#[tokio::test]
async fn test_same_timestamp_fill_arriving_late_is_applied() {
    let (repo, _temp) = setup_repo().await;
    let first = fill(1, "BTC", 5000, Side::Buy, "1", "0", "0.1", "0");
    let mock = Arc::new(MockDataSource::new().with_fill(&account(), first.clone()));
    let reconciler = Reconciler::new(mock.clone(), repo.clone(), Decimal::zero());
    assert_eq!(run_once(&reconciler).await.unwrap().applied, 1);

    // Second fill of the same order, same millisecond, delivered one cycle later.
    let mut second = fill(1, "BTC", 5000, Side::Buy, "2", "1", "0.2", "0");
    second.tid = Some(999);
    mock.set_fills(&account(), vec![second, first]).unwrap();

    let report = run_once(&reconciler).await.unwrap();
    assert_eq!(report.candidates, 2);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.applied, 1);

    let state = repo
        .latest_accumulator_state(&account(), &Coin::new("BTC".to_string()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.open_long, d("3"));
    assert_eq!(state.fee_reserve_long, d("0.3"));
}

#[tokio::test]
async fn test_feed_failure_writes_nothing() {
    let (repo, _temp) = setup_repo().await;
    let mock = Arc::new(
        MockDataSource::new()
            .with_fills(&account(), history())
            .failing(),
    );
    let reconciler = Reconciler::new(mock, repo.clone(), Decimal::zero());

    assert!(matches!(
        run_once(&reconciler).await,
        Err(ReconcileError::DataSource(_))
    ));
    assert!(repo
        .entries(&account(), None, None, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_overflowing_fill_is_isolated() {
    let (repo, _temp) = setup_repo().await;
    let mut huge = fill(7, "SOL", 1500, Side::Buy, "1", "0", "0", "0");
    huge.sz = d("100000000000000000000");
    huge.px = d("100000000000000000000");

    let mut fills = history();
    fills.push(huge);
    let mock = Arc::new(MockDataSource::new().with_fills(&account(), fills));
    let reconciler = Reconciler::new(mock, repo.clone(), d("5"));

    let report = run_once(&reconciler).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.applied, 6);
}

#[tokio::test]
async fn test_out_of_range_position_is_recorded_for_audit() {
    let (repo, _temp) = setup_repo().await;
    let max = "79228162514264337593543950335";
    let mut extreme = fill(8, "SOL", 1500, Side::Buy, max, max, "0", "0");
    extreme.px = d("1");

    let mut fills = history();
    fills.push(extreme);
    let mock = Arc::new(MockDataSource::new().with_fills(&account(), fills));
    let reconciler = Reconciler::new(mock, repo.clone(), Decimal::zero());

    let report = run_once(&reconciler).await.unwrap();
    assert_eq!(report.failed, 0);
    assert_eq!(report.applied, 7);

    let sol = repo
        .entries(&account(), Some(&Coin::new("SOL".to_string())), None, None)
        .await
        .unwrap();
    assert_eq!(sol.len(), 1);
    assert!(sol[0].direction.label().starts_with("Unknown"));
    assert_eq!(repo.count_eligible(&account(), None).await.unwrap(), 6);
}

/// Store wrapper whose next append for one oid fails.
struct FlakyStore {
    inner: Arc<Repository>,
    fail_oid: i64,
    armed: AtomicBool,
}

#[async_trait]
impl TradeStore for FlakyStore {
    async fn append_if_absent(&self, entry: &LedgerEntry) -> Result<bool, StoreError> {
        if entry.fill.oid == self.fail_oid && self.armed.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Corrupt("injected write failure".to_string()));
        }
        self.inner.append_if_absent(entry).await
    }

    async fn latest_accumulator_state(
        &self,
        account: &Address,
        coin: &Coin,
    ) -> Result<Option<AccumulatorState>, StoreError> {
        self.inner.latest_accumulator_state(account, coin).await
    }

    async fn max_timestamp(&self, account: &Address) -> Result<Option<TimeMs>, StoreError> {
        self.inner.max_timestamp(account).await
    }

    async fn existing_dedup_keys(
        &self,
        account: &Address,
        since: TimeMs,
    ) -> Result<HashSet<String>, StoreError> {
        self.inner.existing_dedup_keys(account, since).await
    }

    async fn sum_field(
        &self,
        account: &Address,
        field: SumField,
        since: Option<TimeMs>,
    ) -> Result<Decimal, StoreError> {
        self.inner.sum_field(account, field, since).await
    }

    async fn count_eligible(
        &self,
        account: &Address,
        since: Option<TimeMs>,
    ) -> Result<i64, StoreError> {
        self.inner.count_eligible(account, since).await
    }

    async fn entries(
        &self,
        account: &Address,
        coin: Option<&Coin>,
        from: Option<TimeMs>,
        to: Option<TimeMs>,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        self.inner.entries(account, coin, from, to).await
    }

    async fn latest_states(&self, account: &Address) -> Result<Vec<CoinState>, StoreError> {
        self.inner.latest_states(account).await
    }
}

#[tokio::test]
async fn test_store_failure_is_retried_next_cycle() {
    let (repo, _temp) = setup_repo().await;
    let (clean_repo, _clean_temp) = setup_repo().await;

    let flaky = Arc::new(FlakyStore {
        inner: repo.clone(),
        fail_oid: 4,
        armed: AtomicBool::new(true),
    });
    let mock = Arc::new(MockDataSource::new().with_fills(&account(), history()));
    let reconciler = Reconciler::new(mock.clone(), flaky, d("5"));

    let first = run_once(&reconciler).await.unwrap();
    assert_eq!(first.applied, 3);
    assert_eq!(first.failed, 1);
    assert_eq!(first.deferred, 2);
    // Nothing newer than the failed fill is written, so the watermark stays below it.
    assert_eq!(
        repo.max_timestamp(&account()).await.unwrap(),
        Some(TimeMs::new(2000))
    );

    let second = run_once(&reconciler).await.unwrap();
    assert_eq!(second.applied, 3);
    assert_eq!(second.failed, 0);

    run_once(&Reconciler::new(mock, clean_repo.clone(), d("5")))
        .await
        .unwrap();

    let recovered = repo.entries(&account(), None, None, None).await.unwrap();
    let clean = clean_repo.entries(&account(), None, None, None).await.unwrap();
    assert_eq!(snapshot(&recovered), snapshot(&clean));
}
