//! Prometheus metrics and structured logging for the quorum engine.
//!
//! Provides observability from Day 1:
//! - Prometheus metrics for rounds, vetoes, slots, routing, and PnL
//! - Structured JSON logging with tracing
//! - Session statistics output

pub mod error;
pub mod logging;
pub mod metrics;
pub mod session_stats;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, LogFormat};
pub use metrics::Metrics;
pub use session_stats::{SessionStatsReporter, SymbolSessionStats};
