//! Net PnL and locally charged fee computation.

use crate::domain::{Decimal, Direction};
use crate::engine::LedgerError;

/// Everything the net PnL of one fill depends on.
#[derive(Debug, Clone, Copy)]
pub struct NetPnlInput<'a> {
    pub closed_pnl: Decimal,
    pub exchange_fee: Decimal,
    pub bot_fee: Decimal,
    pub realized_fee: Decimal,
    pub direction: &'a Direction,
    pub close_fee_only: Option<Decimal>,
}

/// Venue PnL minus every fee attributable to the closing trade.
///
/// Open and Increase never realize anything, so their net PnL is exactly zero.
/// For a flip only the closing leg's fee share counts; the opening leg's share
/// sits in the new side's reserve.
pub fn net_pnl(input: NetPnlInput<'_>) -> Result<Decimal, LedgerError> {
    if input.direction.is_growth() {
        return Ok(Decimal::zero());
    }

    let total_fees = match input.close_fee_only {
        Some(close_fee) => close_fee.checked_add(input.realized_fee),
        None => input
            .exchange_fee
            .checked_add(input.bot_fee)
            .and_then(|fees| fees.checked_add(input.realized_fee)),
    }
    .ok_or(LedgerError::Overflow("net pnl fees"))?;

    input
        .closed_pnl
        .checked_sub(total_fees)
        .ok_or(LedgerError::Overflow("net pnl"))
}

const BPS_DIVISOR: i64 = 10_000;

/// Locally charged fee: `size × price × bps / 10000`.
pub fn bot_fee(size: Decimal, price: Decimal, bps: Decimal) -> Result<Decimal, LedgerError> {
    size.checked_mul(price)
        .and_then(|notional| notional.checked_mul(bps))
        .and_then(|scaled| scaled.checked_div(Decimal::from(BPS_DIVISOR)))
        .ok_or(LedgerError::Overflow("bot fee"))
}
