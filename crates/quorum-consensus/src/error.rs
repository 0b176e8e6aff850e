//! Consensus error types.

use quorum_core::Symbol;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("Round already closed for {0}")]
    RoundClosed(Symbol),

    #[error("No open round for {0}")]
    NoOpenRound(Symbol),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type ConsensusResult<T> = Result<T, ConsensusError>;
