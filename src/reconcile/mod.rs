//! Incremental reconciliation of venue fills into the ledger.
//!
//! This module provides:
//! - Inclusive timestamp watermark and dedup filtering of the fetched fill set
//! - Deterministic ordering of the new fills
//! - One classify/apply/append unit per fill with per-fill error isolation

use crate::datasource::DataSourceError;
use crate::db::StoreError;
use crate::domain::Address;
use serde::Serialize;
use thiserror::Error;

pub mod incremental;

pub use incremental::Reconciler;

/// Failures that abort a whole account cycle. Nothing is written when these occur
/// before the first fill unit.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Feed fetch failed: {0}")]
    DataSource(#[from] DataSourceError),
    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of one reconciliation cycle for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub account: Address,
    /// Fills returned by the feed.
    pub fetched: usize,
    /// Fills at or after the watermark.
    pub candidates: usize,
    /// Candidates already stored, repeated in the batch, or written concurrently.
    pub duplicates: usize,
    pub applied: usize,
    pub failed: usize,
    /// New fills left for the next cycle (shutdown or store write failure).
    pub deferred: usize,
}

impl CycleReport {
    pub fn new(account: Address) -> Self {
        Self {
            account,
            ..Default::default()
        }
    }
}
