//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] quorum_core::CoreError),

    #[error("Consensus error: {0}")]
    Consensus(#[from] quorum_consensus::ConsensusError),

    #[error("Risk error: {0}")]
    Risk(#[from] quorum_risk::RiskError),

    #[error("Slot error: {0}")]
    Slot(#[from] quorum_slot::SlotError),

    #[error("Router error: {0}")]
    Router(#[from] quorum_router::RouterError),

    #[error("Execution error: {0}")]
    Execution(#[from] quorum_execution::ExecutionError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] quorum_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shutdown requested")]
    Shutdown,
}

pub type AppResult<T> = Result<T, AppError>;
