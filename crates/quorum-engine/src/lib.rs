//! Quorum engine binary crate.
//!
//! Wires the consensus, risk, slot, routing, execution, and telemetry
//! crates into one running application with an admin command surface.

pub mod app;
pub mod config;
pub mod error;
mod executor;

pub use app::{Application, EngineCommand, EngineHandle, EngineStatus};
pub use config::{AppConfig, VenueConfig};
pub use error::{AppError, AppResult};
