//! Core domain types for the quorum trading engine.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Price`, `Size`: precision-safe numeric types
//! - `Symbol`, `VenueId`: market identifiers
//! - `AgentSignal`, `Action`, `Timeframe`: decision inputs
//! - `CompositeOrder`, `ChildOrder`: routed order model
//! - `EventBus`: append-only engine event stream with monotonic ids

pub mod decimal;
pub mod dedup;
pub mod error;
pub mod event;
pub mod ids;
pub mod market;
pub mod order;
pub mod signal;

pub use decimal::{Price, Size};
pub use dedup::RecentSet;
pub use error::{CoreError, Result};
pub use event::{EngineEvent, EventBus, EventKind};
pub use ids::{AgentId, CompositeId, OrderId, ReservationId, RoundId, SlotId};
pub use market::{ExecMode, Symbol, VenueId};
pub use order::{
    ChildOrder, ChildStatus, CompositeOrder, CompositeResolution, OrderSide, ResolutionStatus,
};
pub use signal::{Action, AgentSignal, Timeframe};
