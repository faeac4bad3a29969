//! Fill type representing a single trade execution reported by the venue.

use crate::domain::{Address, Coin, Decimal, Side, TimeMs};
use serde::{Deserialize, Serialize};

/// Liquidation metadata attached to a fill that was part of a liquidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Liquidation {
    /// Liquidation method; `market` for a market liquidation.
    pub method: String,
    /// The account whose position was liquidated.
    pub liquidated_user: Option<Address>,
    /// Mark price at liquidation time.
    pub mark_px: Option<Decimal>,
}

impl Liquidation {
    pub fn is_market(&self) -> bool {
        self.method == "market"
    }

    /// True when `account` is the party being liquidated (not the taker).
    pub fn liquidates(&self, account: &Address) -> bool {
        self.liquidated_user
            .as_ref()
            .is_some_and(|user| user.matches(account.as_str()))
    }
}

/// A single trade fill/execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    /// Venue order id. Several fills can share one.
    pub oid: i64,
    /// Venue trade id, when reported.
    pub tid: Option<i64>,
    pub coin: Coin,
    pub time_ms: TimeMs,
    pub px: Decimal,
    /// Non-negative magnitude.
    pub sz: Decimal,
    pub side: Side,
    /// Signed position immediately before this fill.
    pub start_position: Decimal,
    /// Venue-reported realized PnL attributable to this fill.
    pub closed_pnl: Decimal,
    /// Venue fee charged for this fill.
    pub fee: Decimal,
    /// Venue's own direction string (e.g. "Open Long"), if reported.
    pub dir: Option<String>,
    pub liquidation: Option<Liquidation>,
}

impl Fill {
    /// Content-derived identity of this fill.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            oid: self.oid,
            coin: self.coin.clone(),
            time_ms: self.time_ms,
            sz: self.sz,
            start_position: self.start_position,
        }
    }
}

/// Identity of a fill for deduplication: `(oid, coin, time, size, startPosition)`.
///
/// Decimals are compared in canonical form, so `1.50` and `1.5` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub oid: i64,
    pub coin: Coin,
    pub time_ms: TimeMs,
    pub sz: Decimal,
    pub start_position: Decimal,
}

impl DedupKey {
    /// Stable hex digest used as the persisted unique key.
    pub fn digest(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.oid.to_le_bytes());
        hasher.update(self.coin.as_str());
        hasher.update([0u8]);
        hasher.update(self.time_ms.as_ms().to_le_bytes());
        hasher.update(self.sz.to_canonical_string());
        hasher.update([0u8]);
        hasher.update(self.start_position.to_canonical_string());
        let hash = hasher.finalize();
        hex::encode(&hash[..16])
    }
}
