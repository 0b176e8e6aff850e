//! Error types for quorum-core.

use thiserror::Error;

/// Core error types.
///
/// These cover the validation class of the engine's error taxonomy:
/// malformed inputs are rejected immediately with no state change.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid confidence: {0} (must be within [0, 1])")]
    InvalidConfidence(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid slippage bound: {0}")]
    InvalidSlippage(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Unknown timeframe: {0}")]
    UnknownTimeframe(String),

    #[error("Unknown execution mode: {0} (expected shadow, paper, or live)")]
    UnknownMode(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
