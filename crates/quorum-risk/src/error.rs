//! Risk gate errors and veto reason codes.

use quorum_core::{ReservationId, Symbol, VenueId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an approval request was vetoed.
///
/// A veto is expected behavior, not a bug. It is final for the round that
/// produced the request.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum VetoReason {
    #[error("Kill switch engaged")]
    KillSwitchEngaged,

    #[error("Consensus action is hold")]
    HoldAction,

    #[error("Quorum not met: {got} signals < {need} required")]
    QuorumNotMet { got: usize, need: usize },

    #[error("Consecutive loss throttle: {losses} losses >= limit")]
    LossThrottle { losses: u32 },

    #[error("Exposure cap exceeded for symbol {0}")]
    SymbolExposureExceeded(Symbol),

    #[error("Exposure cap exceeded for venue {0}")]
    VenueExposureExceeded(VenueId),

    #[error("High volatility regime")]
    HighVolatility,
}

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Vetoed: {0}")]
    Veto(VetoReason),

    /// A release or commit referenced a reservation we never issued.
    /// Consistency violation; the caller must halt the affected slot.
    #[error("Unknown reservation {0}")]
    UnknownReservation(ReservationId),

    #[error("Reservation {0} already released")]
    DoubleRelease(ReservationId),

    #[error("Risk gate task is not running")]
    ChannelClosed,
}

impl RiskError {
    /// Whether this error signals a consistency violation that must halt
    /// the affected slot rather than be recovered locally.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, Self::UnknownReservation(_) | Self::DoubleRelease(_))
    }
}

pub type RiskResult<T> = Result<T, RiskError>;
