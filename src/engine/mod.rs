//! Pure computation engine(s) for deterministic ledger logic.

use crate::domain::{AccumulatorState, Address, Coin, Decimal, Fill, LedgerEntry};
use std::collections::HashMap;
use tracing::debug;

pub mod classifier;
pub mod fee_amortizer;
pub mod net_pnl;

pub use classifier::classify;
pub use fee_amortizer::{apply, FeeDrift, LedgerError, LedgerUpdate};
pub use net_pnl::{bot_fee, net_pnl, NetPnlInput};

/// Build the ledger row for `fill` applied on top of `state`.
///
/// Classify, charge the local fee, run the fee amortizer and compute net PnL.
/// Nothing is mutated; the caller decides whether the row becomes the new state.
pub fn build_entry(
    account: &Address,
    fill: &Fill,
    state: &AccumulatorState,
    bot_fee_bps: Decimal,
) -> Result<LedgerEntry, LedgerError> {
    let direction = classify(fill, account);
    let charged_bot_fee = bot_fee(fill.sz, fill.px, bot_fee_bps)?;
    let update = apply(state, &direction, fill.sz, fill.fee, charged_bot_fee)?;

    let net = net_pnl(NetPnlInput {
        closed_pnl: fill.closed_pnl,
        exchange_fee: fill.fee,
        bot_fee: charged_bot_fee,
        realized_fee: update.realized_fee,
        direction: &direction,
        close_fee_only: update.close_fee_only,
    })?;

    Ok(LedgerEntry {
        account: account.clone(),
        fill: fill.clone(),
        direction,
        exchange_fee: fill.fee,
        bot_fee: charged_bot_fee,
        state: update.state,
        realized_fee: update.realized_fee,
        close_fee_only: update.close_fee_only,
        net_pnl: net,
    })
}

/// Accumulator states for every coin of one account.
///
/// Rows are prepared against the current state and only committed once they are
/// durably stored, so a failed write leaves the state where it was.
#[derive(Debug, Clone)]
pub struct PositionLedger {
    account: Address,
    bot_fee_bps: Decimal,
    states: HashMap<Coin, AccumulatorState>,
}

impl PositionLedger {
    pub fn new(account: Address, bot_fee_bps: Decimal) -> Self {
        Self {
            account,
            bot_fee_bps,
            states: HashMap::new(),
        }
    }

    pub fn account(&self) -> &Address {
        &self.account
    }

    /// Known state for `coin`, if it has been seeded or committed this cycle.
    pub fn state(&self, coin: &Coin) -> Option<&AccumulatorState> {
        self.states.get(coin)
    }

    pub fn seed(&mut self, coin: Coin, state: AccumulatorState) {
        self.states.insert(coin, state);
    }

    /// Drop a coin's state so it is reloaded from the store.
    pub fn forget(&mut self, coin: &Coin) {
        self.states.remove(coin);
    }

    pub fn prepare(&self, fill: &Fill) -> Result<LedgerEntry, LedgerError> {
        let state = self.states.get(&fill.coin).copied().unwrap_or_default();
        build_entry(&self.account, fill, &state, self.bot_fee_bps)
    }

    pub fn commit(&mut self, entry: &LedgerEntry) {
        debug!(
            coin = %entry.fill.coin,
            direction = %entry.direction,
            remaining_long = %entry.remaining_long(),
            remaining_short = %entry.remaining_short(),
            "Ledger state advanced"
        );
        self.states.insert(entry.fill.coin.clone(), entry.state);
    }

    /// Prepare and commit in one step, for purely in-memory folds.
    pub fn process_fill(&mut self, fill: &Fill) -> Result<LedgerEntry, LedgerError> {
        let entry = self.prepare(fill)?;
        self.commit(&entry);
        Ok(entry)
    }
}
