//! Signal aggregation and multi-timeframe consensus.
//!
//! The `RoundBook` collects per-agent, per-timeframe signals into
//! per-symbol rounds; the `ConsensusEngine` turns a closed round into a
//! single action, confidence, and size recommendation.

pub mod engine;
pub mod error;
pub mod round;

pub use engine::{ConsensusConfig, ConsensusEngine, Verdict};
pub use error::{ConsensusError, ConsensusResult};
pub use round::{ConsensusRound, RoundBook};
