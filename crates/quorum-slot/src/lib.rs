//! Capital slot lifecycle management.
//!
//! Each unit of allocated capital is a `Slot` with a strict state
//! machine; the `SlotManagerTask` actor owns the pool and is the single
//! writer for every transition.

pub mod error;
pub mod manager;
pub mod position;
pub mod slot;

pub use error::{SlotError, SlotResult};
pub use manager::{
    spawn_slot_manager, ExecutionRequest, SlotConfig, SlotManagerHandle, SlotManagerTask, SlotView,
};
pub use position::{ExitTrigger, Position};
pub use slot::{Slot, SlotState};
