//! Storage abstraction for the append-only ledger.

use crate::domain::{AccumulatorState, Address, Coin, Decimal, LedgerEntry, TimeMs};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("Corrupt ledger row: {0}")]
    Corrupt(String),
}

/// Ledger columns that can be aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SumField {
    ClosedPnl,
    NetPnl,
    RealizedFee,
    ExchangeFee,
    BotFee,
}

impl SumField {
    pub(crate) fn column(self) -> &'static str {
        match self {
            SumField::ClosedPnl => "closed_pnl",
            SumField::NetPnl => "net_pnl",
            SumField::RealizedFee => "realized_fee",
            SumField::ExchangeFee => "exchange_fee",
            SumField::BotFee => "bot_fee",
        }
    }
}

/// Latest accumulator state of one coin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinState {
    pub coin: Coin,
    pub state: AccumulatorState,
    pub last_fill_ms: TimeMs,
}

/// Durable, append-only ledger storage.
///
/// Rows are never updated or deleted. Aggregates only cover rows whose
/// direction is PnL-eligible.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Insert the entry unless its dedup key is already stored for the account.
    ///
    /// Returns `true` if a row was written.
    async fn append_if_absent(&self, entry: &LedgerEntry) -> Result<bool, StoreError>;

    /// State after the most recently inserted row for (account, coin).
    async fn latest_accumulator_state(
        &self,
        account: &Address,
        coin: &Coin,
    ) -> Result<Option<AccumulatorState>, StoreError>;

    async fn max_timestamp(&self, account: &Address) -> Result<Option<TimeMs>, StoreError>;

    /// Dedup digests of rows with `time_ms >= since`.
    async fn existing_dedup_keys(
        &self,
        account: &Address,
        since: TimeMs,
    ) -> Result<HashSet<String>, StoreError>;

    async fn sum_field(
        &self,
        account: &Address,
        field: SumField,
        since: Option<TimeMs>,
    ) -> Result<Decimal, StoreError>;

    async fn count_eligible(
        &self,
        account: &Address,
        since: Option<TimeMs>,
    ) -> Result<i64, StoreError>;

    /// Ledger rows in insertion order, optionally filtered by coin and time window.
    async fn entries(
        &self,
        account: &Address,
        coin: Option<&Coin>,
        from: Option<TimeMs>,
        to: Option<TimeMs>,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Latest state per coin, ordered by coin.
    async fn latest_states(&self, account: &Address) -> Result<Vec<CoinState>, StoreError>;
}
