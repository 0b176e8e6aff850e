//! Slot manager actor.
//!
//! Owns the fixed slot pool; every trigger that can move a slot —
//! consensus verdicts, execution resolutions, mark prices, admin
//! commands, kill-switch trips — arrives as a message and is applied one
//! at a time, so concurrent triggers against the same slot are serialized
//! rather than locked.
//!
//! The manager never talks to venues. Entry, exit, and cancel work is
//! emitted as `ExecutionRequest`s on an outbound channel consumed by the
//! routing layer.

use crate::error::{SlotError, SlotResult};
use crate::position::{ExitTrigger, Position};
use crate::slot::{Slot, SlotState};
use quorum_core::{
    CompositeId, CompositeResolution, EventBus, EventKind, ExecMode, OrderId, OrderSide, Price,
    ReservationId, ResolutionStatus, RoundId, Size, SlotId, Symbol,
};
use quorum_risk::{ApprovalRequest, RiskError, RiskGateHandle, VetoReason};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Slot pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Slots in the fixed pool created at startup.
    #[serde(default = "default_slot_count")]
    pub slot_count: u32,
    /// Stop-loss distance from entry, percent. Zero disables.
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    /// Take-profit distance from entry, percent. Zero disables.
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: Decimal,
    /// Minimum fill ratio for an entry to count as an acceptable fill.
    #[serde(default = "default_min_fill_ratio")]
    pub min_fill_ratio: Decimal,
}

fn default_slot_count() -> u32 {
    4
}

fn default_stop_loss_pct() -> Decimal {
    Decimal::TWO
}

fn default_take_profit_pct() -> Decimal {
    Decimal::new(4, 0)
}

fn default_min_fill_ratio() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            slot_count: default_slot_count(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            min_fill_ratio: default_min_fill_ratio(),
        }
    }
}

/// Work the manager asks the routing layer to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionRequest {
    /// Enter a position: plan and dispatch a composite order.
    Open {
        slot_id: SlotId,
        round_id: RoundId,
        reservation_id: ReservationId,
        symbol: Symbol,
        side: OrderSide,
        amount: Size,
        /// Per-slot execution mode; `None` means the engine-wide mode.
        mode_override: Option<ExecMode>,
    },
    /// Exit a position (or its remainder) with a fresh composite order.
    Close {
        slot_id: SlotId,
        reservation_id: ReservationId,
        symbol: Symbol,
        side: OrderSide,
        quantity: Size,
        trigger: ExitTrigger,
        mode_override: Option<ExecMode>,
    },
    /// Best-effort cancel of one child order. Fire and forget.
    Cancel { order_id: OrderId },
}

/// Point-in-time view of one slot for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub id: SlotId,
    pub state: SlotState,
    pub symbol: Option<Symbol>,
    pub halted: bool,
    /// Execution mode override; `None` follows the engine-wide mode.
    pub mode: Option<ExecMode>,
}

enum SlotManagerMsg {
    Decide {
        request: ApprovalRequest,
    },
    /// The routing layer dispatched child orders for a slot's composite.
    Dispatched {
        slot_id: SlotId,
        composite_id: CompositeId,
        order_ids: Vec<OrderId>,
    },
    Resolved(CompositeResolution),
    MarkPrice {
        symbol: Symbol,
        price: Price,
    },
    RequestClose {
        slot_id: SlotId,
        reply: oneshot::Sender<SlotResult<()>>,
    },
    Freeze {
        slot_id: SlotId,
        reply: oneshot::Sender<SlotResult<()>>,
    },
    Unfreeze {
        slot_id: SlotId,
        reply: oneshot::Sender<SlotResult<()>>,
    },
    SetSlotMode {
        slot_id: SlotId,
        mode: Option<ExecMode>,
        reply: oneshot::Sender<SlotResult<()>>,
    },
    KillSwitchTripped,
    Snapshot {
        reply: oneshot::Sender<Vec<SlotView>>,
    },
    Shutdown,
}

/// Slot manager actor task.
pub struct SlotManagerTask {
    rx: mpsc::Receiver<SlotManagerMsg>,
    config: SlotConfig,
    slots: Vec<Slot>,
    risk: RiskGateHandle,
    bus: EventBus,
    exec_tx: mpsc::Sender<ExecutionRequest>,
    /// Composites abandoned by a kill-switch trip; their late
    /// resolutions are dropped instead of treated as inconsistencies.
    abandoned: HashSet<CompositeId>,
}

impl SlotManagerTask {
    pub async fn run(mut self) {
        debug!(slots = self.slots.len(), "SlotManagerTask started");

        while let Some(msg) = self.rx.recv().await {
            match msg {
                SlotManagerMsg::Shutdown => {
                    debug!("SlotManagerTask shutting down");
                    break;
                }
                msg => self.handle_message(msg).await,
            }
        }

        debug!("SlotManagerTask terminated");
    }

    async fn handle_message(&mut self, msg: SlotManagerMsg) {
        match msg {
            SlotManagerMsg::Decide { request } => self.on_decide(request).await,
            SlotManagerMsg::Dispatched {
                slot_id,
                composite_id,
                order_ids,
            } => self.on_dispatched(slot_id, composite_id, order_ids).await,
            SlotManagerMsg::Resolved(resolution) => self.on_resolved(resolution).await,
            SlotManagerMsg::MarkPrice { symbol, price } => self.on_mark_price(symbol, price).await,
            SlotManagerMsg::RequestClose { slot_id, reply } => {
                let result = self.close_slot(slot_id, ExitTrigger::Manual).await;
                let _ = reply.send(result);
            }
            SlotManagerMsg::Freeze { slot_id, reply } => {
                let _ = reply.send(self.on_freeze(slot_id));
            }
            SlotManagerMsg::Unfreeze { slot_id, reply } => {
                let _ = reply.send(self.on_unfreeze(slot_id));
            }
            SlotManagerMsg::SetSlotMode {
                slot_id,
                mode,
                reply,
            } => {
                let _ = reply.send(self.on_set_mode(slot_id, mode));
            }
            SlotManagerMsg::KillSwitchTripped => self.on_kill_tripped().await,
            SlotManagerMsg::Snapshot { reply } => {
                let views = self
                    .slots
                    .iter()
                    .map(|s| SlotView {
                        id: s.id,
                        state: s.state(),
                        symbol: s.symbol.clone(),
                        halted: s.is_halted(),
                        mode: s.mode,
                    })
                    .collect();
                let _ = reply.send(views);
            }
            SlotManagerMsg::Shutdown => {}
        }
    }

    /// Route a consensus verdict through the risk gate into a slot.
    async fn on_decide(&mut self, request: ApprovalRequest) {
        // Kill switch is checked before any transition starts. The round
        // still gets its veto outcome; no slot is touched.
        if self.risk.kill_switch().is_engaged() {
            debug!(round_id = %request.round_id, "kill switch engaged, vetoing round");
            self.publish_veto(&request, &VetoReason::KillSwitchEngaged.to_string());
            return;
        }

        // A symbol already being worked takes no new entry. An open
        // position against an opposite verdict is a reversal exit.
        if let Some(idx) = self.busy_slot_for(&request.symbol) {
            let slot = &self.slots[idx];
            let reversal = slot.state() == SlotState::Open
                && slot
                    .position
                    .as_ref()
                    .zip(OrderSide::from_action(request.action))
                    .is_some_and(|(pos, side)| pos.side == side.opposite());
            if reversal {
                info!(slot_id = %slot.id, symbol = %request.symbol, "consensus reversal");
                let _ = self
                    .close_slot(self.slots[idx].id, ExitTrigger::ConsensusReversal)
                    .await;
            } else {
                trace!(symbol = %request.symbol, "symbol already in flight, verdict dropped");
            }
            return;
        }

        let Some(idx) = self.slots.iter().position(|s| s.is_free()) else {
            warn!(symbol = %request.symbol, "no free slot");
            self.publish_veto(&request, "no free slot");
            return;
        };

        {
            let slot = &mut self.slots[idx];
            slot.symbol = Some(request.symbol.clone());
            slot.round_id = Some(request.round_id);
        }
        if self.transition(idx, SlotState::Evaluating).is_err() {
            return;
        }

        match self.risk.approve(request.clone()).await {
            Ok(approval) => {
                let slot = &mut self.slots[idx];
                slot.reservation_id = Some(approval.reservation_id);
                slot.entry_amount = Some(approval.size);
                let Some(side) = OrderSide::from_action(request.action) else {
                    // Hold is vetoed by the gate; this arm is unreachable
                    // unless the gate's invariant is broken.
                    let _ = self.transition(idx, SlotState::Empty);
                    return;
                };
                if self.transition(idx, SlotState::Opening).is_err() {
                    return;
                }
                let _ = self
                    .exec_tx
                    .send(ExecutionRequest::Open {
                        slot_id: self.slots[idx].id,
                        round_id: request.round_id,
                        reservation_id: approval.reservation_id,
                        symbol: request.symbol,
                        side,
                        amount: approval.size,
                        mode_override: self.slots[idx].mode,
                    })
                    .await;
            }
            Err(RiskError::Veto(reason)) => {
                self.publish_veto(&request, &reason.to_string());
                let _ = self.transition(idx, SlotState::Empty);
            }
            Err(err) => {
                warn!(%err, "risk gate unavailable, abandoning evaluation");
                let _ = self.transition(idx, SlotState::Empty);
            }
        }
    }

    async fn on_dispatched(
        &mut self,
        slot_id: SlotId,
        composite_id: CompositeId,
        order_ids: Vec<OrderId>,
    ) {
        let Some(idx) = self.slot_index(slot_id) else {
            warn!(%slot_id, "dispatch for unknown slot");
            return;
        };

        let slot = &mut self.slots[idx];
        if matches!(slot.state(), SlotState::Opening | SlotState::Closing) {
            slot.composite_id = Some(composite_id);
            slot.in_flight_orders = order_ids;
            return;
        }

        // The slot moved on (kill-switch trip) before dispatch landed;
        // the orders are orphaned and get cancelled best-effort.
        warn!(%slot_id, %composite_id, "dispatch after slot left in-flight state, cancelling");
        self.abandoned.insert(composite_id);
        for order_id in order_ids {
            self.request_cancel_raw(order_id).await;
        }
    }

    /// Apply the exactly-once composite resolution to the owning slot.
    async fn on_resolved(&mut self, resolution: CompositeResolution) {
        if self.abandoned.remove(&resolution.composite_id) {
            debug!(composite_id = %resolution.composite_id, "resolution for abandoned composite dropped");
            return;
        }

        let Some(idx) = self.slot_index(resolution.slot_id) else {
            warn!(slot_id = %resolution.slot_id, "resolution for unknown slot");
            return;
        };
        if self.slots[idx].is_halted() {
            return;
        }

        // A resolution that does not match the slot's in-flight composite
        // is a duplicate or out-of-order event. Fatal for the slot.
        if self.slots[idx].composite_id != Some(resolution.composite_id) {
            self.halt_slot(idx, "resolution does not match in-flight composite");
            return;
        }

        match self.slots[idx].state() {
            SlotState::Opening => self.on_entry_resolved(idx, resolution).await,
            SlotState::Closing => self.on_exit_resolved(idx, resolution).await,
            state => {
                warn!(slot_id = %resolution.slot_id, %state, "resolution in unexpected state");
                self.halt_slot(idx, "resolution outside an in-flight state");
            }
        }
    }

    async fn on_entry_resolved(&mut self, idx: usize, resolution: CompositeResolution) {
        let requested = {
            let slot = &mut self.slots[idx];
            slot.composite_id = None;
            slot.in_flight_orders.clear();
            slot.entry_amount.unwrap_or(resolution.filled_quantity)
        };

        let accepted = match resolution.status {
            ResolutionStatus::Filled => true,
            // Partial entries below the configured fill ratio are unwound.
            ResolutionStatus::Partial => {
                resolution.fill_ratio(requested) >= self.config.min_fill_ratio
            }
            ResolutionStatus::Failed => false,
        };

        if accepted {
            let slot = &mut self.slots[idx];
            slot.position = Some(Position::open(
                resolution.symbol.clone(),
                resolution.side,
                resolution.filled_quantity,
                resolution.avg_price,
                self.config.stop_loss_pct,
                self.config.take_profit_pct,
            ));
            let _ = self.transition(idx, SlotState::Open);
        } else {
            info!(
                slot_id = %resolution.slot_id,
                status = ?resolution.status,
                "entry not accepted, unwinding reservation"
            );
            self.release_reservation(idx).await;
            let _ = self.transition(idx, SlotState::Empty);
        }
    }

    async fn on_exit_resolved(&mut self, idx: usize, resolution: CompositeResolution) {
        {
            let slot = &mut self.slots[idx];
            slot.composite_id = None;
            slot.in_flight_orders.clear();
        }

        if resolution.status == ResolutionStatus::Failed {
            // Nothing exited. The position is intact; retry is a fresh,
            // explicitly re-planned composite via RequestClose.
            warn!(slot_id = %resolution.slot_id, "exit order failed, position still open");
            return;
        }

        let (pnl, remaining, trigger) = {
            let slot = &mut self.slots[idx];
            let trigger = slot.exit_trigger.unwrap_or(ExitTrigger::Manual);
            let Some(position) = slot.position.as_mut() else {
                self.halt_slot(idx, "exit resolution without a position");
                return;
            };
            let pnl = position.realized_pnl(resolution.avg_price, resolution.filled_quantity)
                - resolution.total_fee;
            position.quantity = position.quantity.saturating_sub(resolution.filled_quantity);
            (pnl, position.quantity, trigger)
        };

        self.risk.record_outcome(pnl).await;
        self.bus.publish(EventKind::PositionClosed {
            slot_id: resolution.slot_id,
            symbol: resolution.symbol.clone(),
            trigger: trigger.to_string(),
            realized_pnl: pnl,
        });
        info!(
            slot_id = %resolution.slot_id,
            %pnl,
            %remaining,
            "exit fill recorded"
        );

        if remaining.is_zero() {
            self.release_reservation(idx).await;
            let _ = self.transition(idx, SlotState::Empty);
        } else {
            // Partial exit: re-plan the remainder as a new composite.
            let slot = &self.slots[idx];
            if let (Some(reservation_id), Some(position)) =
                (slot.reservation_id, slot.position.as_ref())
            {
                let trigger = slot.exit_trigger.unwrap_or(ExitTrigger::Manual);
                let _ = self
                    .exec_tx
                    .send(ExecutionRequest::Close {
                        slot_id: slot.id,
                        reservation_id,
                        symbol: position.symbol.clone(),
                        side: position.side.opposite(),
                        quantity: remaining,
                        trigger,
                        mode_override: slot.mode,
                    })
                    .await;
            }
        }
    }

    async fn on_mark_price(&mut self, symbol: Symbol, price: Price) {
        let triggered: Vec<(SlotId, ExitTrigger)> = self
            .slots
            .iter()
            .filter(|s| s.state() == SlotState::Open && s.symbol.as_ref() == Some(&symbol))
            .filter_map(|s| {
                s.position
                    .as_ref()
                    .and_then(|p| p.exit_trigger(price))
                    .map(|t| (s.id, t))
            })
            .collect();

        for (slot_id, trigger) in triggered {
            info!(%slot_id, %symbol, %trigger, %price, "exit trigger hit");
            let _ = self.close_slot(slot_id, trigger).await;
        }
    }

    /// Begin (or re-plan) closing an open position.
    async fn close_slot(&mut self, slot_id: SlotId, trigger: ExitTrigger) -> SlotResult<()> {
        let idx = self
            .slot_index(slot_id)
            .ok_or(SlotError::UnknownSlot(slot_id))?;

        match self.slots[idx].state() {
            SlotState::Open => {
                self.slots[idx].exit_trigger = Some(trigger);
                self.transition(idx, SlotState::Closing)?;
            }
            SlotState::Closing if self.slots[idx].composite_id.is_none() => {
                // Re-planning after a failed exit composite.
            }
            state => {
                return Err(SlotError::InvalidTransition {
                    slot_id,
                    from: state,
                    to: SlotState::Closing,
                });
            }
        }

        let slot = &self.slots[idx];
        let (Some(reservation_id), Some(position)) =
            (slot.reservation_id, slot.position.as_ref())
        else {
            return Err(SlotError::InvalidTransition {
                slot_id,
                from: slot.state(),
                to: SlotState::Closing,
            });
        };
        let _ = self
            .exec_tx
            .send(ExecutionRequest::Close {
                slot_id,
                reservation_id,
                symbol: position.symbol.clone(),
                side: position.side.opposite(),
                quantity: position.quantity,
                trigger,
                mode_override: slot.mode,
            })
            .await;
        Ok(())
    }

    /// Force every slot to a safe state after the kill switch engages.
    /// Idempotent per order id: repeat trips cannot re-cancel.
    async fn on_kill_tripped(&mut self) {
        for idx in 0..self.slots.len() {
            if self.slots[idx].is_halted() || self.slots[idx].is_frozen() {
                continue;
            }
            match self.slots[idx].state() {
                SlotState::Evaluating => {
                    let _ = self.transition(idx, SlotState::Empty);
                }
                SlotState::Opening => {
                    let cancels: Vec<OrderId> = {
                        let slot = &mut self.slots[idx];
                        let ids: Vec<OrderId> = slot.in_flight_orders.clone();
                        ids.into_iter()
                            .filter(|id| slot.mark_cancel_requested(id))
                            .collect()
                    };
                    for order_id in cancels {
                        self.request_cancel_raw(order_id).await;
                    }
                    if let Some(composite_id) = self.slots[idx].composite_id {
                        self.abandoned.insert(composite_id);
                    }
                    self.release_reservation(idx).await;
                    let _ = self.transition(idx, SlotState::Empty);
                }
                SlotState::Open => {
                    let _ = self.close_slot(self.slots[idx].id, ExitTrigger::KillSwitch).await;
                }
                // Closing already reduces risk; Empty has nothing to do.
                _ => {}
            }
        }
    }

    fn on_freeze(&mut self, slot_id: SlotId) -> SlotResult<()> {
        let idx = self
            .slot_index(slot_id)
            .ok_or(SlotError::UnknownSlot(slot_id))?;
        self.slots[idx].freeze()?;
        self.bus.publish(EventKind::SlotFrozen { slot_id });
        Ok(())
    }

    fn on_unfreeze(&mut self, slot_id: SlotId) -> SlotResult<()> {
        let idx = self
            .slot_index(slot_id)
            .ok_or(SlotError::UnknownSlot(slot_id))?;
        self.slots[idx].unfreeze()?;
        self.bus.publish(EventKind::SlotUnfrozen { slot_id });
        Ok(())
    }

    /// Set or clear a slot's execution mode override. Takes effect from
    /// the next entry; an in-flight composite keeps the mode it was
    /// dispatched under.
    fn on_set_mode(&mut self, slot_id: SlotId, mode: Option<ExecMode>) -> SlotResult<()> {
        let idx = self
            .slot_index(slot_id)
            .ok_or(SlotError::UnknownSlot(slot_id))?;
        info!(%slot_id, ?mode, "slot mode override set");
        self.slots[idx].mode = mode;
        Ok(())
    }

    /// Release the slot's reservation exactly once; a double release is
    /// a consistency violation that halts the slot.
    async fn release_reservation(&mut self, idx: usize) {
        let Some(reservation_id) = self.slots[idx].reservation_id.take() else {
            return;
        };
        match self.risk.release(reservation_id).await {
            Ok(_) => {}
            Err(err) if err.is_consistency_violation() => {
                self.halt_slot(idx, &err.to_string());
            }
            Err(err) => {
                warn!(%err, "reservation release failed");
            }
        }
    }

    fn halt_slot(&mut self, idx: usize, reason: &str) {
        self.slots[idx].halt(reason);
        self.bus.publish(EventKind::SlotHalted {
            slot_id: self.slots[idx].id,
            reason: reason.to_string(),
        });
    }

    fn transition(&mut self, idx: usize, to: SlotState) -> SlotResult<()> {
        let from = self.slots[idx].state();
        self.slots[idx].transition(to)?;
        self.bus.publish(EventKind::SlotTransition {
            slot_id: self.slots[idx].id,
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(())
    }

    fn publish_veto(&self, request: &ApprovalRequest, reason: &str) {
        self.bus.publish(EventKind::Vetoed {
            round_id: request.round_id,
            symbol: request.symbol.clone(),
            reason: reason.to_string(),
        });
    }

    async fn request_cancel_raw(&self, order_id: OrderId) {
        self.bus.publish(EventKind::OrderCancelRequested {
            order_id: order_id.clone(),
        });
        let _ = self.exec_tx.send(ExecutionRequest::Cancel { order_id }).await;
    }

    fn slot_index(&self, slot_id: SlotId) -> Option<usize> {
        self.slots.iter().position(|s| s.id == slot_id)
    }

    fn busy_slot_for(&self, symbol: &Symbol) -> Option<usize> {
        self.slots.iter().position(|s| {
            s.state() != SlotState::Empty && s.symbol.as_ref() == Some(symbol)
        })
    }
}

/// Cloneable handle to the slot manager actor.
#[derive(Clone)]
pub struct SlotManagerHandle {
    tx: mpsc::Sender<SlotManagerMsg>,
}

impl SlotManagerHandle {
    /// Feed a consensus verdict (as an approval request) into the pool.
    pub async fn decide(&self, request: ApprovalRequest) {
        let _ = self.tx.send(SlotManagerMsg::Decide { request }).await;
    }

    /// Report that child orders were dispatched for a slot's composite.
    pub async fn dispatched(
        &self,
        slot_id: SlotId,
        composite_id: CompositeId,
        order_ids: Vec<OrderId>,
    ) {
        let _ = self
            .tx
            .send(SlotManagerMsg::Dispatched {
                slot_id,
                composite_id,
                order_ids,
            })
            .await;
    }

    /// Deliver the exactly-once composite resolution.
    pub async fn resolved(&self, resolution: CompositeResolution) {
        let _ = self.tx.send(SlotManagerMsg::Resolved(resolution)).await;
    }

    /// Feed a mark price for stop/target evaluation.
    pub async fn mark_price(&self, symbol: Symbol, price: Price) {
        let _ = self
            .tx
            .send(SlotManagerMsg::MarkPrice { symbol, price })
            .await;
    }

    /// Manually close a slot's position.
    pub async fn request_close(&self, slot_id: SlotId) -> SlotResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SlotManagerMsg::RequestClose { slot_id, reply })
            .await
            .map_err(|_| SlotError::ChannelClosed)?;
        rx.await.map_err(|_| SlotError::ChannelClosed)?
    }

    pub async fn freeze(&self, slot_id: SlotId) -> SlotResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SlotManagerMsg::Freeze { slot_id, reply })
            .await
            .map_err(|_| SlotError::ChannelClosed)?;
        rx.await.map_err(|_| SlotError::ChannelClosed)?
    }

    pub async fn unfreeze(&self, slot_id: SlotId) -> SlotResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SlotManagerMsg::Unfreeze { slot_id, reply })
            .await
            .map_err(|_| SlotError::ChannelClosed)?;
        rx.await.map_err(|_| SlotError::ChannelClosed)?
    }

    /// Set (`Some`) or clear (`None`) a slot's execution mode override.
    pub async fn set_mode(&self, slot_id: SlotId, mode: Option<ExecMode>) -> SlotResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SlotManagerMsg::SetSlotMode {
                slot_id,
                mode,
                reply,
            })
            .await
            .map_err(|_| SlotError::ChannelClosed)?;
        rx.await.map_err(|_| SlotError::ChannelClosed)?
    }

    /// Notify the pool that the kill switch engaged.
    pub async fn kill_switch_tripped(&self) {
        let _ = self.tx.send(SlotManagerMsg::KillSwitchTripped).await;
    }

    pub async fn snapshot(&self) -> SlotResult<Vec<SlotView>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SlotManagerMsg::Snapshot { reply })
            .await
            .map_err(|_| SlotError::ChannelClosed)?;
        rx.await.map_err(|_| SlotError::ChannelClosed)
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(SlotManagerMsg::Shutdown).await;
    }
}

/// Spawn the slot manager actor.
///
/// Returns the handle, the outbound execution request stream, and the
/// task join handle.
pub fn spawn_slot_manager(
    config: SlotConfig,
    risk: RiskGateHandle,
    bus: EventBus,
    capacity: usize,
) -> (
    SlotManagerHandle,
    mpsc::Receiver<ExecutionRequest>,
    JoinHandle<()>,
) {
    let (tx, rx) = mpsc::channel(capacity);
    let (exec_tx, exec_rx) = mpsc::channel(capacity);

    let slots = (0..config.slot_count).map(|i| Slot::new(SlotId(i))).collect();
    let task = SlotManagerTask {
        rx,
        config,
        slots,
        risk,
        bus,
        exec_tx,
        abandoned: HashSet::new(),
    };
    let join = tokio::spawn(task.run());

    (SlotManagerHandle { tx }, exec_rx, join)
}
