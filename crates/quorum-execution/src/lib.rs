//! Execution tracking.
//!
//! The tracker actor consumes terminal child-order events and emits
//! exactly one `CompositeResolution` per composite order.

pub mod error;
pub mod tracker;

pub use error::{ExecutionError, ExecutionResult};
pub use tracker::{
    spawn_execution_tracker, ExecutionTrackerHandle, ExecutionTrackerTask, TrackedView, TrackerMsg,
};
