//! Routing and venue errors.

use quorum_core::{CoreError, Price, Size, VenueId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error("No venues available")]
    NoVenues,

    #[error("Insufficient depth: requested {requested}, available {available}")]
    InsufficientDepth { requested: Size, available: Size },

    #[error("Slippage exceeded: vwap {vwap} beyond limit {limit}")]
    SlippageExceeded { vwap: Price, limit: Price },

    #[error("Venue {0} timed out")]
    VenueTimeout(VenueId),

    #[error("Venue {venue} rejected order: {reason}")]
    VenueRejected { venue: VenueId, reason: String },

    #[error("Venue {venue} has no quote for the symbol")]
    NoQuote { venue: VenueId },
}

impl RouterError {
    /// Plan rejections are expected outcomes; venue-level errors during
    /// dispatch are execution failures.
    pub fn is_plan_rejection(&self) -> bool {
        matches!(
            self,
            Self::Invalid(_)
                | Self::NoVenues
                | Self::InsufficientDepth { .. }
                | Self::SlippageExceeded { .. }
        )
    }
}

pub type RouterResult<T> = Result<T, RouterError>;
