//! Slot lifecycle errors.

use crate::slot::SlotState;
use quorum_core::{SlotId, Symbol};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("Slot {slot_id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        slot_id: SlotId,
        from: SlotState,
        to: SlotState,
    },

    /// The slot was halted after a consistency violation and takes no
    /// further automatic transitions.
    #[error("Slot {0} is halted")]
    Halted(SlotId),

    #[error("Slot {0} is frozen")]
    Frozen(SlotId),

    #[error("No free slot for {0}")]
    NoFreeSlot(Symbol),

    #[error("Unknown slot {0}")]
    UnknownSlot(SlotId),

    #[error("Slot manager task is not running")]
    ChannelClosed,
}

pub type SlotResult<T> = Result<T, SlotError>;
