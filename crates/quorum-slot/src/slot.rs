//! One capital slot and its lifecycle state machine.

use crate::error::{SlotError, SlotResult};
use crate::position::{ExitTrigger, Position};
use quorum_core::{CompositeId, ExecMode, OrderId, ReservationId, RoundId, Size, SlotId, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, error};

/// Lifecycle state of a capital slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SlotState {
    /// No capital committed; available for a new round.
    Empty,
    /// A consensus verdict is being risk-checked against this slot.
    Evaluating,
    /// Capital reserved; entry composite order in flight.
    Opening,
    /// Position held.
    Open,
    /// Exit composite order in flight.
    Closing,
    /// Manually frozen; no new transitions, in-flight orders untouched.
    Frozen,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "EMPTY"),
            Self::Evaluating => write!(f, "EVALUATING"),
            Self::Opening => write!(f, "OPENING"),
            Self::Open => write!(f, "OPEN"),
            Self::Closing => write!(f, "CLOSING"),
            Self::Frozen => write!(f, "FROZEN"),
        }
    }
}

/// A reusable unit of allocated trading capital.
///
/// Slots are created at startup and reused across trades; only the
/// manager's single-writer loop mutates them, which is what makes every
/// transition exclusive.
#[derive(Debug)]
pub struct Slot {
    pub id: SlotId,
    state: SlotState,
    /// State to resume on unfreeze.
    resume_state: Option<SlotState>,
    /// Set after a consistency violation; never cleared automatically.
    halted: bool,
    /// Execution mode override for this slot; `None` follows the
    /// engine-wide mode. Survives the slot emptying.
    pub mode: Option<ExecMode>,
    /// Symbol being worked while the slot is non-empty.
    pub symbol: Option<Symbol>,
    /// Round that triggered the current transition.
    pub round_id: Option<RoundId>,
    /// Exposure reservation held from approval until resolution.
    pub reservation_id: Option<ReservationId>,
    /// Approved entry amount, for fill-ratio checks on resolution.
    pub entry_amount: Option<Size>,
    /// In-flight composite order, at most one at a time.
    pub composite_id: Option<CompositeId>,
    /// Child order ids of the in-flight composite.
    pub in_flight_orders: Vec<OrderId>,
    /// Order ids for which a cancel was already requested.
    pub cancel_requested: HashSet<OrderId>,
    pub position: Option<Position>,
    /// Why the position is being closed, while in `Closing`.
    pub exit_trigger: Option<ExitTrigger>,
}

impl Slot {
    pub fn new(id: SlotId) -> Self {
        Self {
            id,
            state: SlotState::Empty,
            resume_state: None,
            halted: false,
            mode: None,
            symbol: None,
            round_id: None,
            reservation_id: None,
            entry_amount: None,
            composite_id: None,
            in_flight_orders: Vec::new(),
            cancel_requested: HashSet::new(),
            position: None,
            exit_trigger: None,
        }
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn is_frozen(&self) -> bool {
        self.state == SlotState::Frozen
    }

    /// Available for a new round.
    pub fn is_free(&self) -> bool {
        self.state == SlotState::Empty && !self.halted
    }

    /// Apply a lifecycle transition, validating the edge.
    pub fn transition(&mut self, to: SlotState) -> SlotResult<()> {
        if self.halted {
            return Err(SlotError::Halted(self.id));
        }
        if self.state == SlotState::Frozen {
            return Err(SlotError::Frozen(self.id));
        }

        let valid = matches!(
            (self.state, to),
            (SlotState::Empty, SlotState::Evaluating)
                | (SlotState::Evaluating, SlotState::Opening)
                | (SlotState::Evaluating, SlotState::Empty)
                | (SlotState::Opening, SlotState::Open)
                | (SlotState::Opening, SlotState::Empty)
                | (SlotState::Open, SlotState::Closing)
                | (SlotState::Closing, SlotState::Empty)
        );
        if !valid {
            return Err(SlotError::InvalidTransition {
                slot_id: self.id,
                from: self.state,
                to,
            });
        }

        debug!(slot_id = %self.id, from = %self.state, to = %to, "slot transition");
        self.state = to;
        if to == SlotState::Empty {
            self.clear();
        }
        Ok(())
    }

    /// Freeze in place. In-flight orders are left untouched; only new
    /// transitions are blocked.
    pub fn freeze(&mut self) -> SlotResult<()> {
        if self.halted {
            return Err(SlotError::Halted(self.id));
        }
        if self.state == SlotState::Frozen {
            return Ok(());
        }
        self.resume_state = Some(self.state);
        self.state = SlotState::Frozen;
        Ok(())
    }

    /// Resume the state held at freeze time.
    pub fn unfreeze(&mut self) -> SlotResult<()> {
        if self.state != SlotState::Frozen {
            return Ok(());
        }
        let resume = self.resume_state.take().unwrap_or(SlotState::Empty);
        self.state = resume;
        Ok(())
    }

    /// Halt the slot in its current state after a consistency violation.
    /// Manual inspection required; there is no unhalt operation.
    pub fn halt(&mut self, reason: &str) {
        error!(slot_id = %self.id, state = %self.state, reason, "SLOT HALTED");
        self.halted = true;
    }

    /// Record that a cancel was requested for an order. Returns `true`
    /// only the first time, so repeat kill-switch trips cannot emit a
    /// second cancellation for the same id.
    pub fn mark_cancel_requested(&mut self, order_id: &OrderId) -> bool {
        self.cancel_requested.insert(order_id.clone())
    }

    fn clear(&mut self) {
        self.symbol = None;
        self.round_id = None;
        self.reservation_id = None;
        self.entry_amount = None;
        self.composite_id = None;
        self.in_flight_orders.clear();
        self.cancel_requested.clear();
        self.position = None;
        self.exit_trigger = None;
    }
}
