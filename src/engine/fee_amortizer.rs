//! Per-instrument position ledger with fee amortization.
//!
//! Fees paid while a side grows are held in that side's reserve and released into
//! `realized_fee` in proportion to the size closed. Transitions are pure: they take a
//! state snapshot and return the next one.

use crate::domain::{
    AccumulatorState, Decimal, Direction, PositionSide, FEE_DRIFT_TOLERANCE, SIZE_TOLERANCE,
};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
    #[error("non-positive size {0} for a position-changing fill")]
    NonPositiveSize(Decimal),
}

/// Reserve residue left on a side that just went flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeDrift {
    pub side: PositionSide,
    pub residue: Decimal,
}

/// Result of applying one fill to an [`AccumulatorState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerUpdate {
    pub state: AccumulatorState,
    pub realized_fee: Decimal,
    /// Fee share of the closing leg of a flip.
    pub close_fee_only: Option<Decimal>,
    /// Set when a flat side still carried more than the drift tolerance in reserve.
    pub drift: Option<FeeDrift>,
}

impl LedgerUpdate {
    fn unchanged(state: &AccumulatorState) -> Self {
        Self {
            state: *state,
            realized_fee: Decimal::zero(),
            close_fee_only: None,
            drift: None,
        }
    }
}

/// Apply one classified fill to `state`.
pub fn apply(
    state: &AccumulatorState,
    direction: &Direction,
    size: Decimal,
    exchange_fee: Decimal,
    bot_fee: Decimal,
) -> Result<LedgerUpdate, LedgerError> {
    let total_fee = add(exchange_fee, bot_fee, "total fee")?;

    match direction {
        Direction::Open { side } | Direction::Increase { side } => {
            require_positive(size)?;
            grow(state, *side, size, total_fee)
        }
        Direction::Close { side, .. } | Direction::Decrease { side, .. } => {
            require_positive(size)?;
            reduce(state, *side, size)
        }
        Direction::Flip { from } => {
            require_positive(size)?;
            flip(state, *from, size, total_fee)
        }
        Direction::Invalid { .. } | Direction::Unknown { .. } => {
            Ok(LedgerUpdate::unchanged(state))
        }
    }
}

fn grow(
    state: &AccumulatorState,
    side: PositionSide,
    size: Decimal,
    total_fee: Decimal,
) -> Result<LedgerUpdate, LedgerError> {
    let mut next = *state;
    next.set_open(side, add(state.open(side), size, "open size")?);
    let reserve = add(state.fee_reserve(side), total_fee, "fee reserve")?;
    next.set_fee_reserve(side, floor_reserve(side, reserve));

    Ok(LedgerUpdate {
        state: next,
        realized_fee: Decimal::zero(),
        close_fee_only: None,
        drift: None,
    })
}

fn reduce(
    state: &AccumulatorState,
    side: PositionSide,
    size: Decimal,
) -> Result<LedgerUpdate, LedgerError> {
    let mut next = *state;
    let remaining_before = sub(state.open(side), state.close(side), "remaining size")?;
    next.set_close(side, add(state.close(side), size, "close size")?);

    let reserve = state.fee_reserve(side);
    let mut realized_fee = Decimal::zero();
    if remaining_before.is_positive() && reserve.is_positive() {
        let proportion = div(size, remaining_before, "close proportion")?.min(Decimal::one());
        realized_fee = mul(reserve, proportion, "realized fee")?;
        next.set_fee_reserve(side, sub(reserve, realized_fee, "fee reserve")?);
    }

    let drift = settle_flat_side(&mut next, side, &mut realized_fee)?;

    Ok(LedgerUpdate {
        state: next,
        realized_fee,
        close_fee_only: None,
        drift,
    })
}

fn flip(
    state: &AccumulatorState,
    from: PositionSide,
    size: Decimal,
    total_fee: Decimal,
) -> Result<LedgerUpdate, LedgerError> {
    let to = from.opposite();
    let mut next = *state;

    // The closing leg is the old side's net exposure, |open - close|, which is
    // still non-zero when tracking started on a position opened before the first fill.
    let close_size = sub(state.open(from), state.close(from), "close leg size")?.abs();
    let open_size = sub(size, close_size, "open leg size")?;

    let close_ratio = div(close_size, size, "close leg ratio")?.min(Decimal::one());
    let close_fee_share = mul(total_fee, close_ratio, "close fee share")?;
    let open_fee_share = sub(total_fee, close_fee_share, "open fee share")?;

    next.set_close(from, add(state.close(from), close_size, "close size")?);
    let mut realized_fee = state.fee_reserve(from).max(Decimal::zero());
    next.set_fee_reserve(from, Decimal::zero());

    if open_size.is_positive() {
        next.set_open(to, add(state.open(to), open_size, "open size")?);
        let reserve = add(state.fee_reserve(to), open_fee_share, "fee reserve")?;
        next.set_fee_reserve(to, floor_reserve(to, reserve));
    }

    let drift = settle_flat_side(&mut next, from, &mut realized_fee)?;

    Ok(LedgerUpdate {
        state: next,
        realized_fee,
        close_fee_only: Some(close_fee_share),
        drift,
    })
}

/// Force a flat side's reserve to zero, moving any residue into `realized_fee`.
fn settle_flat_side(
    state: &mut AccumulatorState,
    side: PositionSide,
    realized_fee: &mut Decimal,
) -> Result<Option<FeeDrift>, LedgerError> {
    let reserve = state.fee_reserve(side);
    if !state.remaining(side).is_zero() {
        state.set_fee_reserve(side, reserve.snap_to_zero(SIZE_TOLERANCE));
        return Ok(None);
    }
    if reserve.is_zero() {
        return Ok(None);
    }

    *realized_fee = add(*realized_fee, reserve, "realized fee")?;
    state.set_fee_reserve(side, Decimal::zero());

    if reserve.abs() > FEE_DRIFT_TOLERANCE {
        warn!(
            side = %side,
            residue = %reserve,
            "Position fully closed but fee reserve was not zero; settling residue"
        );
        return Ok(Some(FeeDrift {
            side,
            residue: reserve,
        }));
    }
    Ok(None)
}

/// Rebates can push a reserve below zero; it never goes negative.
fn floor_reserve(side: PositionSide, reserve: Decimal) -> Decimal {
    if reserve.is_negative() {
        warn!(side = %side, reserve = %reserve, "Negative fee reserve floored at zero");
        return Decimal::zero();
    }
    reserve.snap_to_zero(SIZE_TOLERANCE)
}

fn require_positive(size: Decimal) -> Result<(), LedgerError> {
    if size.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::NonPositiveSize(size))
    }
}

fn add(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, LedgerError> {
    a.checked_add(b).ok_or(LedgerError::Overflow(what))
}

fn sub(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, LedgerError> {
    a.checked_sub(b).ok_or(LedgerError::Overflow(what))
}

fn mul(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, LedgerError> {
    a.checked_mul(b).ok_or(LedgerError::Overflow(what))
}

fn div(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, LedgerError> {
    a.checked_div(b).ok_or(LedgerError::Overflow(what))
}
