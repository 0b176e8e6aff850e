//! Open position owned by a slot.

use chrono::{DateTime, Utc};
use quorum_core::{OrderSide, Price, Size, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an open position is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitTrigger {
    StopHit,
    TargetHit,
    ConsensusReversal,
    Manual,
    KillSwitch,
}

impl fmt::Display for ExitTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopHit => write!(f, "stop_hit"),
            Self::TargetHit => write!(f, "target_hit"),
            Self::ConsensusReversal => write!(f, "consensus_reversal"),
            Self::Manual => write!(f, "manual"),
            Self::KillSwitch => write!(f, "kill_switch"),
        }
    }
}

/// An open position. Created on fill, destroyed on close; owned
/// exclusively by its slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: OrderSide,
    /// Remaining quantity, always positive.
    pub quantity: Size,
    pub entry_price: Price,
    pub stop_price: Option<Price>,
    pub target_price: Option<Price>,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Open a position from an entry fill, deriving stop and target
    /// levels from percentage offsets of the entry price. A zero
    /// percentage disables the corresponding level.
    pub fn open(
        symbol: Symbol,
        side: OrderSide,
        quantity: Size,
        entry_price: Price,
        stop_loss_pct: Decimal,
        take_profit_pct: Decimal,
    ) -> Self {
        let hundred = Decimal::ONE_HUNDRED;
        let sign = Decimal::from(side.sign());
        let stop_price = (!stop_loss_pct.is_zero()).then(|| {
            Price::new(entry_price.inner() * (Decimal::ONE - sign * stop_loss_pct / hundred))
        });
        let target_price = (!take_profit_pct.is_zero()).then(|| {
            Price::new(entry_price.inner() * (Decimal::ONE + sign * take_profit_pct / hundred))
        });

        Self {
            symbol,
            side,
            quantity,
            entry_price,
            stop_price,
            target_price,
            opened_at: Utc::now(),
        }
    }

    /// Mark-to-market PnL in quote currency.
    pub fn unrealized_pnl(&self, mark: Price) -> Decimal {
        (mark.inner() - self.entry_price.inner())
            * self.quantity.inner()
            * Decimal::from(self.side.sign())
    }

    /// PnL realized by closing `quantity` at `exit_price`, before fees.
    pub fn realized_pnl(&self, exit_price: Price, quantity: Size) -> Decimal {
        (exit_price.inner() - self.entry_price.inner())
            * quantity.inner()
            * Decimal::from(self.side.sign())
    }

    /// Whether the mark price has crossed the stop or target level.
    /// Stop is checked before target.
    pub fn exit_trigger(&self, mark: Price) -> Option<ExitTrigger> {
        match self.side {
            OrderSide::Buy => {
                if self.stop_price.is_some_and(|stop| mark <= stop) {
                    return Some(ExitTrigger::StopHit);
                }
                if self.target_price.is_some_and(|target| mark >= target) {
                    return Some(ExitTrigger::TargetHit);
                }
            }
            OrderSide::Sell => {
                if self.stop_price.is_some_and(|stop| mark >= stop) {
                    return Some(ExitTrigger::StopHit);
                }
                if self.target_price.is_some_and(|target| mark <= target) {
                    return Some(ExitTrigger::TargetHit);
                }
            }
        }
        None
    }
}
