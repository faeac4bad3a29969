//! Domain types and determinism layer for the fee-adjusted PnL ledger.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Domain primitives: TimeMs, Address, Coin, Side
//! - Fill, dedup key and classified Direction types
//! - Ledger rows and the per-instrument accumulator state
//! - Stable fill ordering key helper for deterministic processing

pub mod decimal;
pub mod direction;
pub mod fill;
pub mod ledger;
pub mod ordering;
pub mod primitives;

pub use decimal::Decimal;
pub use direction::{Direction, PositionSide};
pub use fill::{DedupKey, Fill, Liquidation};
pub use ledger::{
    AccumulatorState, LedgerEntry, FEE_DRIFT_TOLERANCE, LIQUIDATION_SIZE_TOLERANCE,
    SIZE_TOLERANCE,
};
pub use ordering::{sort_fills_deterministic, FillOrderingKey};
pub use primitives::{Address, Coin, Side, TimeMs};
