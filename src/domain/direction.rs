//! Classified effect of a fill on the account's position.

use crate::domain::{Decimal, Side};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of a position (as opposed to the side of a trade).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// The position side a trade grows when opening from flat.
    pub fn opened_by(side: Side) -> Self {
        match side {
            Side::Buy => PositionSide::Long,
            Side::Sell => PositionSide::Short,
        }
    }

    /// Side of a signed, non-zero position size.
    pub fn of_position(size: Decimal) -> Self {
        if size.is_negative() {
            PositionSide::Short
        } else {
            PositionSide::Long
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PositionSide::Long => "Long",
            PositionSide::Short => "Short",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a fill relative to the position it was applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Direction {
    /// Opens a position from flat.
    Open { side: PositionSide },
    /// Grows an existing position.
    Increase { side: PositionSide },
    /// Takes the position to flat.
    Close {
        side: PositionSide,
        liquidation: bool,
    },
    /// Shrinks the position without closing it.
    Decrease {
        side: PositionSide,
        liquidation: bool,
    },
    /// Closes `from` entirely and opens the opposite side with the remainder.
    Flip { from: PositionSide },
    /// Non-positive size.
    Invalid { sz: Decimal },
    /// Nothing matched; raw inputs kept for audit.
    Unknown {
        dir: Option<String>,
        side: Side,
        start_position: Decimal,
        sz: Decimal,
    },
}

impl Direction {
    /// Open or Increase: the position grows and nothing is realized.
    pub fn is_growth(&self) -> bool {
        matches!(self, Direction::Open { .. } | Direction::Increase { .. })
    }

    /// Whether rows with this direction count toward PnL aggregates.
    pub fn is_pnl_eligible(&self) -> bool {
        !matches!(self, Direction::Invalid { .. } | Direction::Unknown { .. })
    }

    /// Human-readable label, stable across releases.
    pub fn label(&self) -> String {
        match self {
            Direction::Open { side } => format!("Open {}", side),
            Direction::Increase { side } => format!("Increase {}", side),
            Direction::Close {
                side,
                liquidation: false,
            } => format!("Close {}", side),
            Direction::Close {
                side,
                liquidation: true,
            } => format!("Close {} (Liquidation)", side),
            Direction::Decrease {
                side,
                liquidation: false,
            } => format!("Decrease {}", side),
            Direction::Decrease {
                side,
                liquidation: true,
            } => format!("Decrease {} (Partial Liquidation)", side),
            Direction::Flip { from } => format!("Close {} + Open {}", from, from.opposite()),
            Direction::Invalid { sz } => format!("Invalid (sz: {})", sz),
            Direction::Unknown {
                dir,
                side,
                start_position,
                sz,
            } => format!(
                "Unknown (dir: {}, side: {}, startPosition: {}, sz: {})",
                dir.as_deref().unwrap_or(""),
                side,
                start_position,
                sz
            ),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(
            Direction::Open {
                side: PositionSide::Long
            }
            .label(),
            "Open Long"
        );
        assert_eq!(
            Direction::Close {
                side: PositionSide::Short,
                liquidation: true
            }
            .label(),
            "Close Short (Liquidation)"
        );
        assert_eq!(
            Direction::Decrease {
                side: PositionSide::Long,
                liquidation: true
            }
            .label(),
            "Decrease Long (Partial Liquidation)"
        );
        assert_eq!(
            Direction::Flip {
                from: PositionSide::Short
            }
            .label(),
            "Close Short + Open Long"
        );
        assert_eq!(
            Direction::Invalid {
                sz: Decimal::zero()
            }
            .label(),
            "Invalid (sz: 0)"
        );
    }

    #[test]
    fn test_flip_is_not_growth() {
        let flip = Direction::Flip {
            from: PositionSide::Long,
        };
        assert!(!flip.is_growth());
        assert!(flip.is_pnl_eligible());
    }

    #[test]
    fn test_unknown_and_invalid_not_pnl_eligible() {
        let unknown = Direction::Unknown {
            dir: None,
            side: Side::Buy,
            start_position: Decimal::zero(),
            sz: Decimal::one(),
        };
        assert!(!unknown.is_pnl_eligible());
        assert!(!unknown.is_growth());
        assert!(!Direction::Invalid {
            sz: Decimal::zero()
        }
        .is_pnl_eligible());
    }

    #[test]
    fn test_json_roundtrip_keeps_structure() {
        let dir = Direction::Decrease {
            side: PositionSide::Short,
            liquidation: true,
        };
        let json = serde_json::to_string(&dir).unwrap();
        assert!(json.contains("\"kind\":\"decrease\""));
        let back: Direction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dir);
    }
}
