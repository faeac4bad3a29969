//! Direction classification from raw fill fields.

use crate::domain::{
    Address, Decimal, Direction, Fill, PositionSide, LIQUIDATION_SIZE_TOLERANCE, SIZE_TOLERANCE,
};
use tracing::{debug, warn};

/// Classify `fill` relative to the monitored `account`.
///
/// Deterministic: identical inputs always produce the identical direction, which is
/// what makes reprocessing a fill safe.
pub fn classify(fill: &Fill, account: &Address) -> Direction {
    let sz = fill.sz;
    let start = fill.start_position;

    if !sz.is_positive() {
        warn!(oid = fill.oid, coin = %fill.coin, sz = %sz, "Fill with non-positive size");
        return Direction::Invalid { sz };
    }

    if let Some(direction) = classify_liquidation(fill, account) {
        return direction;
    }

    let Some(new_position) = Decimal::from(i64::from(fill.side.sign()))
        .checked_mul(sz)
        .and_then(|delta| start.checked_add(delta))
    else {
        warn!(
            oid = fill.oid,
            coin = %fill.coin,
            start_position = %start,
            sz = %sz,
            "Position after fill is out of range"
        );
        return unknown(fill);
    };

    if start.is_near_zero(SIZE_TOLERANCE) {
        return Direction::Open {
            side: PositionSide::opened_by(fill.side),
        };
    }

    let side = PositionSide::of_position(start);

    if new_position.signum() == start.signum() && new_position.abs() > start.abs() {
        return Direction::Increase { side };
    }
    if new_position.is_near_zero(SIZE_TOLERANCE) {
        return Direction::Close {
            side,
            liquidation: false,
        };
    }
    if new_position.signum() == start.signum() && new_position.abs() < start.abs() {
        return Direction::Decrease {
            side,
            liquidation: false,
        };
    }
    if new_position.signum() == -start.signum() {
        return Direction::Flip { from: side };
    }

    warn!(
        oid = fill.oid,
        coin = %fill.coin,
        dir = fill.dir.as_deref().unwrap_or(""),
        side = %fill.side,
        start_position = %start,
        sz = %sz,
        "Unable to classify fill direction"
    );
    unknown(fill)
}

fn unknown(fill: &Fill) -> Direction {
    Direction::Unknown {
        dir: fill.dir.clone(),
        side: fill.side,
        start_position: fill.start_position,
        sz: fill.sz,
    }
}

/// Market liquidation of the monitored account's own position.
fn classify_liquidation(fill: &Fill, account: &Address) -> Option<Direction> {
    let liquidation = fill.liquidation.as_ref()?;
    if !liquidation.is_market() || !liquidation.liquidates(account) {
        return None;
    }

    // The venue's own direction string is authoritative for the liquidated side.
    let dir = fill.dir.as_deref().unwrap_or("");
    let side = if dir.contains("Long") {
        PositionSide::Long
    } else if dir.contains("Short") {
        PositionSide::Short
    } else if fill.start_position.is_negative() {
        PositionSide::Short
    } else {
        PositionSide::Long
    };

    let full = fill
        .sz
        .checked_sub(fill.start_position.abs())
        .is_some_and(|gap| gap.is_near_zero(LIQUIDATION_SIZE_TOLERANCE));
    debug!(
        oid = fill.oid,
        coin = %fill.coin,
        side = %side,
        full,
        "Liquidation of monitored account"
    );

    Some(if full {
        Direction::Close {
            side,
            liquidation: true,
        }
    } else {
        Direction::Decrease {
            side,
            liquidation: true,
        }
    })
}
