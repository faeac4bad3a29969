//! Ledger row and per-instrument accumulator state.

use crate::domain::{Address, DedupKey, Decimal, Direction, Fill, PositionSide};
use serde::{Deserialize, Serialize};

/// Sizes within this distance of zero are zero.
pub const SIZE_TOLERANCE: Decimal = Decimal::from_parts(1, 10);
/// Fee reserve left on a flat side beyond this is reported as drift.
pub const FEE_DRIFT_TOLERANCE: Decimal = Decimal::from_parts(1, 6);
/// A liquidation is full when its size matches the position within this.
pub const LIQUIDATION_SIZE_TOLERANCE: Decimal = Decimal::from_parts(1, 8);

/// Running totals for one (account, coin), as of the latest ledger row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulatorState {
    pub open_long: Decimal,
    pub close_long: Decimal,
    pub fee_reserve_long: Decimal,
    pub open_short: Decimal,
    pub close_short: Decimal,
    pub fee_reserve_short: Decimal,
}

impl AccumulatorState {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn open(&self, side: PositionSide) -> Decimal {
        match side {
            PositionSide::Long => self.open_long,
            PositionSide::Short => self.open_short,
        }
    }

    pub fn close(&self, side: PositionSide) -> Decimal {
        match side {
            PositionSide::Long => self.close_long,
            PositionSide::Short => self.close_short,
        }
    }

    pub fn fee_reserve(&self, side: PositionSide) -> Decimal {
        match side {
            PositionSide::Long => self.fee_reserve_long,
            PositionSide::Short => self.fee_reserve_short,
        }
    }

    pub fn set_open(&mut self, side: PositionSide, value: Decimal) {
        match side {
            PositionSide::Long => self.open_long = value,
            PositionSide::Short => self.open_short = value,
        }
    }

    pub fn set_close(&mut self, side: PositionSide, value: Decimal) {
        match side {
            PositionSide::Long => self.close_long = value,
            PositionSide::Short => self.close_short = value,
        }
    }

    pub fn set_fee_reserve(&mut self, side: PositionSide, value: Decimal) {
        match side {
            PositionSide::Long => self.fee_reserve_long = value,
            PositionSide::Short => self.fee_reserve_short = value,
        }
    }

    /// `max(open − close, 0)`, snapped to an exact zero within [`SIZE_TOLERANCE`].
    pub fn remaining(&self, side: PositionSide) -> Decimal {
        self.open(side)
            .saturating_sub(self.close(side))
            .max(Decimal::zero())
            .snap_to_zero(SIZE_TOLERANCE)
    }

    pub fn remaining_long(&self) -> Decimal {
        self.remaining(PositionSide::Long)
    }

    pub fn remaining_short(&self) -> Decimal {
        self.remaining(PositionSide::Short)
    }

    /// True when neither side has remaining exposure.
    pub fn is_flat(&self) -> bool {
        self.remaining_long().is_zero() && self.remaining_short().is_zero()
    }
}

/// One persisted ledger row: the fill, its classification and the snapshot after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub account: Address,
    pub fill: Fill,
    pub direction: Direction,
    pub exchange_fee: Decimal,
    pub bot_fee: Decimal,
    /// Accumulator state after applying this fill.
    pub state: AccumulatorState,
    pub realized_fee: Decimal,
    /// Fee share of the closing leg, present only for flips.
    pub close_fee_only: Option<Decimal>,
    pub net_pnl: Decimal,
}

impl LedgerEntry {
    pub fn dedup_key(&self) -> DedupKey {
        self.fill.dedup_key()
    }

    pub fn remaining_long(&self) -> Decimal {
        self.state.remaining_long()
    }

    pub fn remaining_short(&self) -> Decimal {
        self.state.remaining_short()
    }
}
