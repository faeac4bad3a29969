//! Repository layer for database operations.
//!
//! `Repository` owns the SQLite pool and implements [`TradeStore`]. The SQL
//! lives in `ledger.rs`.

mod ledger;

use crate::db::store::{CoinState, StoreError, SumField, TradeStore};
use crate::domain::{AccumulatorState, Address, Coin, Decimal, LedgerEntry, TimeMs};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use std::collections::HashSet;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Cheap liveness probe used by the readiness endpoint.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TradeStore for Repository {
    async fn append_if_absent(&self, entry: &LedgerEntry) -> Result<bool, StoreError> {
        self.insert_ledger_entry(entry).await
    }

    async fn latest_accumulator_state(
        &self,
        account: &Address,
        coin: &Coin,
    ) -> Result<Option<AccumulatorState>, StoreError> {
        self.get_latest_state(account, coin).await
    }

    async fn max_timestamp(&self, account: &Address) -> Result<Option<TimeMs>, StoreError> {
        self.get_max_time_ms(account).await
    }

    async fn existing_dedup_keys(
        &self,
        account: &Address,
        since: TimeMs,
    ) -> Result<HashSet<String>, StoreError> {
        self.query_dedup_keys_since(account, since).await
    }

    async fn sum_field(
        &self,
        account: &Address,
        field: SumField,
        since: Option<TimeMs>,
    ) -> Result<Decimal, StoreError> {
        self.sum_eligible(account, field, since).await
    }

    async fn count_eligible(
        &self,
        account: &Address,
        since: Option<TimeMs>,
    ) -> Result<i64, StoreError> {
        self.count_eligible_entries(account, since).await
    }

    async fn entries(
        &self,
        account: &Address,
        coin: Option<&Coin>,
        from: Option<TimeMs>,
        to: Option<TimeMs>,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        self.query_entries(account, coin, from, to).await
    }

    async fn latest_states(&self, account: &Address) -> Result<Vec<CoinState>, StoreError> {
        self.query_latest_states(account).await
    }
}
