//! Composite execution task.
//!
//! Planning and dispatch talk to venues under bounded timeouts, which is
//! still long enough to stall a select loop. They run here, in their own
//! task, so signal intake, mark prices, and the admin surface stay
//! responsive while a venue is slow. Child submissions for an accepted
//! composite are spawned again as their own task; this loop only does
//! planning and bookkeeping.

use crate::app::decimal_f64;
use chrono::Utc;
use parking_lot::RwLock;
use quorum_core::{
    CompositeId, CompositeResolution, EventBus, EventKind, ExecMode, OrderId, OrderSide, Price,
    ReservationId, ResolutionStatus, Size, SlotId, Symbol, VenueId,
};
use quorum_execution::ExecutionTrackerHandle;
use quorum_risk::RiskGateHandle;
use quorum_router::{ChildResult, PlannedComposite, SmartOrderRouter};
use quorum_slot::{ExecutionRequest, SlotManagerHandle};
use quorum_telemetry::Metrics;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Engine-wide execution mode, shared between the control loop and the
/// executor. Per-slot overrides ride the execution requests instead.
#[derive(Clone)]
pub struct SharedMode(Arc<RwLock<ExecMode>>);

impl SharedMode {
    pub fn new(mode: ExecMode) -> Self {
        Self(Arc::new(RwLock::new(mode)))
    }

    pub fn get(&self) -> ExecMode {
        *self.0.read()
    }

    pub fn set(&self, mode: ExecMode) {
        *self.0.write() = mode;
    }
}

pub(crate) struct ExecutorTask {
    exec_rx: mpsc::Receiver<ExecutionRequest>,
    resolution_rx: mpsc::Receiver<CompositeResolution>,
    router: Arc<SmartOrderRouter>,
    risk: RiskGateHandle,
    slots: SlotManagerHandle,
    tracker: ExecutionTrackerHandle,
    bus: EventBus,
    mode: SharedMode,
    /// Order id -> venue, for routing cancels. Cleared on resolution.
    order_venues: HashMap<OrderId, VenueId>,
    /// Composite id -> (requested amount, child order ids).
    composite_index: HashMap<CompositeId, (Size, Vec<OrderId>)>,
}

impl ExecutorTask {
    async fn run(mut self) {
        debug!("executor task started");
        loop {
            tokio::select! {
                request = self.exec_rx.recv() => match request {
                    Some(request) => self.on_execution_request(request).await,
                    None => break,
                },
                resolution = self.resolution_rx.recv() => match resolution {
                    Some(resolution) => self.on_resolution(resolution).await,
                    None => break,
                },
            }
        }
        debug!("executor task stopped");
    }

    async fn on_execution_request(&mut self, request: ExecutionRequest) {
        match request {
            ExecutionRequest::Open {
                slot_id,
                round_id: _,
                reservation_id,
                symbol,
                side,
                amount,
                mode_override,
            } => {
                let mode = mode_override.unwrap_or_else(|| self.mode.get());
                self.run_composite(slot_id, reservation_id, symbol, side, amount, mode, true)
                    .await;
            }
            ExecutionRequest::Close {
                slot_id,
                reservation_id,
                symbol,
                side,
                quantity,
                trigger,
                mode_override,
            } => {
                let mode = mode_override.unwrap_or_else(|| self.mode.get());
                debug!(%slot_id, %trigger, %mode, "planning exit composite");
                self.run_composite(slot_id, reservation_id, symbol, side, quantity, mode, false)
                    .await;
            }
            ExecutionRequest::Cancel { order_id } => {
                self.on_cancel(order_id);
            }
        }
    }

    /// Plan and (mode permitting) dispatch one composite order.
    #[allow(clippy::too_many_arguments)]
    async fn run_composite(
        &mut self,
        slot_id: SlotId,
        reservation_id: ReservationId,
        symbol: Symbol,
        side: OrderSide,
        amount: Size,
        mode: ExecMode,
        is_entry: bool,
    ) {
        let planned = match self
            .router
            .plan_composite(slot_id, reservation_id, &symbol, side, amount)
            .await
        {
            Ok(planned) => planned,
            Err(err) => {
                warn!(%slot_id, %symbol, %err, "plan rejected");
                self.bus.publish(EventKind::PlanRejected {
                    symbol: symbol.clone(),
                    reason: err.to_string(),
                });
                self.unwind_slot(slot_id, reservation_id, symbol, side).await;
                return;
            }
        };

        self.bus.publish(EventKind::PlanAccepted {
            composite_id: planned.order.composite_id,
            symbol: symbol.clone(),
            venue_count: planned.order.children.len(),
            expected_avg_price: planned.expected_avg_price,
            total_fee: planned.total_fee,
        });

        if mode == ExecMode::Shadow {
            self.resolve_shadow(slot_id, planned, is_entry).await;
            return;
        }

        // Record the per-venue split before any order leaves.
        let split: HashMap<VenueId, Size> = planned
            .order
            .children
            .iter()
            .map(|c| (c.venue.clone(), c.quantity))
            .collect();
        if let Err(err) = self.risk.commit_venues(reservation_id, split).await {
            warn!(%slot_id, %err, "venue exposure commit failed, plan abandoned");
            self.bus.publish(EventKind::PlanRejected {
                symbol: symbol.clone(),
                reason: err.to_string(),
            });
            self.unwind_slot(slot_id, reservation_id, symbol, side).await;
            return;
        }

        let order_ids: Vec<OrderId> = planned
            .order
            .children
            .iter()
            .map(|c| c.order_id.clone())
            .collect();
        for child in &planned.order.children {
            self.order_venues
                .insert(child.order_id.clone(), child.venue.clone());
        }
        self.composite_index.insert(
            planned.order.composite_id,
            (planned.order.total_amount, order_ids.clone()),
        );

        if let Err(err) = self.tracker.register(planned.order.clone()).await {
            warn!(%err, "execution tracker unavailable");
        }
        self.slots
            .dispatched(slot_id, planned.order.composite_id, order_ids)
            .await;

        // Child submissions run serially against venues; they get their
        // own task so this loop keeps taking cancels and new requests.
        let order = planned.order;
        let venues: HashMap<OrderId, VenueId> = order
            .children
            .iter()
            .map(|c| (c.order_id.clone(), c.venue.clone()))
            .collect();
        let router = Arc::clone(&self.router);
        let tracker = self.tracker.clone();
        tokio::spawn(async move {
            for result in router.dispatch(&order).await {
                match result {
                    ChildResult::Filled(fill) => {
                        if let Some(venue) = venues.get(&fill.order_id) {
                            Metrics::child_order(venue.as_str(), "filled");
                        }
                        let _ = tracker.child_filled(fill).await;
                    }
                    ChildResult::Failed {
                        order_id,
                        venue,
                        reason,
                    } => {
                        warn!(%order_id, %venue, %reason, "child order failed");
                        Metrics::child_order(venue.as_str(), "failed");
                        let _ = tracker.child_failed(order_id, reason).await;
                    }
                }
            }
        });
    }

    /// Shadow mode: the plan was logged and published; nothing is sent
    /// to a venue. Entries unwind their reservation, exits resolve at
    /// the plan price so the slot can finish its lifecycle.
    async fn resolve_shadow(&mut self, slot_id: SlotId, planned: PlannedComposite, is_entry: bool) {
        info!(
            %slot_id,
            composite_id = %planned.order.composite_id,
            "shadow mode: plan accepted, not dispatched"
        );
        let (status, filled, avg_price) = if is_entry {
            (ResolutionStatus::Failed, Size::ZERO, Price::ZERO)
        } else {
            (
                ResolutionStatus::Filled,
                planned.order.total_amount,
                planned.expected_avg_price,
            )
        };
        let resolution = CompositeResolution {
            composite_id: planned.order.composite_id,
            slot_id,
            reservation_id: planned.order.reservation_id,
            symbol: planned.order.symbol.clone(),
            side: planned.order.side,
            status,
            filled_quantity: filled,
            avg_price,
            total_fee: Decimal::ZERO,
            resolved_at: Utc::now(),
        };
        self.slots
            .dispatched(slot_id, planned.order.composite_id, Vec::new())
            .await;
        self.slots.resolved(resolution).await;
    }

    /// Deliver a synthetic failed resolution so the slot releases its
    /// reservation (entry) or stays closable (exit) after a rejected plan.
    async fn unwind_slot(
        &mut self,
        slot_id: SlotId,
        reservation_id: ReservationId,
        symbol: Symbol,
        side: OrderSide,
    ) {
        let composite_id = CompositeId::new();
        self.slots
            .dispatched(slot_id, composite_id, Vec::new())
            .await;
        self.slots
            .resolved(CompositeResolution {
                composite_id,
                slot_id,
                reservation_id,
                symbol,
                side,
                status: ResolutionStatus::Failed,
                filled_quantity: Size::ZERO,
                avg_price: Price::ZERO,
                total_fee: Decimal::ZERO,
                resolved_at: Utc::now(),
            })
            .await;
    }

    async fn on_resolution(&mut self, resolution: CompositeResolution) {
        if let Some((requested, order_ids)) =
            self.composite_index.remove(&resolution.composite_id)
        {
            for order_id in &order_ids {
                self.order_venues.remove(order_id);
            }
            Metrics::fill_ratio(
                resolution.symbol.as_str(),
                decimal_f64(resolution.fill_ratio(requested)),
            );
        }
        self.slots.resolved(resolution).await;
    }

    /// Cancels are only routed for orders that actually left the engine;
    /// shadow composites never register any.
    fn on_cancel(&mut self, order_id: OrderId) {
        let Some(venue) = self.order_venues.get(&order_id).cloned() else {
            debug!(%order_id, "cancel for unknown order dropped");
            return;
        };
        Metrics::child_order(venue.as_str(), "cancelled");
        let router = Arc::clone(&self.router);
        let tracker = self.tracker.clone();
        tokio::spawn(async move {
            router.cancel(&venue, &order_id).await;
            let _ = tracker.child_cancelled(order_id).await;
        });
    }
}

/// Spawn the executor task over the slot manager's execution requests
/// and the tracker's resolutions.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_executor(
    exec_rx: mpsc::Receiver<ExecutionRequest>,
    resolution_rx: mpsc::Receiver<CompositeResolution>,
    router: Arc<SmartOrderRouter>,
    risk: RiskGateHandle,
    slots: SlotManagerHandle,
    tracker: ExecutionTrackerHandle,
    bus: EventBus,
    mode: SharedMode,
) -> JoinHandle<()> {
    let task = ExecutorTask {
        exec_rx,
        resolution_rx,
        router,
        risk,
        slots,
        tracker,
        bus,
        mode,
        order_venues: HashMap::new(),
        composite_index: HashMap::new(),
    };
    tokio::spawn(task.run())
}
