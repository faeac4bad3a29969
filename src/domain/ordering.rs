//! Stable fill ordering for deterministic processing.

use crate::domain::Fill;

/// Stable ordering key for fills.
///
/// Ordering: time_ms -> oid -> tid -> dedup digest. The digest makes the order total,
/// so same-timestamp fills of one order are always applied in the same sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FillOrderingKey {
    /// Time in milliseconds (primary sort).
    pub time_ms: i64,
    /// Order ID (secondary sort).
    pub oid: i64,
    /// Trade ID, when the venue reports one.
    pub tid: Option<i64>,
    /// Dedup digest (fallback sort).
    pub digest: String,
}

impl FillOrderingKey {
    /// Create an ordering key from a Fill.
    pub fn from_fill(fill: &Fill) -> Self {
        FillOrderingKey {
            time_ms: fill.time_ms.as_ms(),
            oid: fill.oid,
            tid: fill.tid,
            digest: fill.dedup_key().digest(),
        }
    }
}

/// Sort fills deterministically.
pub fn sort_fills_deterministic(fills: &mut [Fill]) {
    fills.sort_by_cached_key(FillOrderingKey::from_fill);
}
