//! Execution tracking errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Execution tracker channel closed")]
    ChannelClosed,
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;
