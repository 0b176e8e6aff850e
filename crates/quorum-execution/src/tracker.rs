//! Execution tracker actor.
//!
//! Receives terminal events for child orders, keyed by order id, and
//! folds them into one `CompositeResolution` per composite. Child events
//! are idempotent: a duplicate for an already-terminal order id is
//! dropped. The resolution is emitted exactly once, when the last child
//! reaches a terminal status.

use crate::error::{ExecutionError, ExecutionResult};
use chrono::Utc;
use quorum_core::{
    ChildStatus, CompositeId, CompositeOrder, CompositeResolution, EventBus, EventKind, OrderId,
    Price, RecentSet, ResolutionStatus, Size,
};
use quorum_router::VenueFill;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Snapshot of one in-flight composite, for the admin surface.
#[derive(Debug, Clone)]
pub struct TrackedView {
    pub composite_id: CompositeId,
    pub children_total: usize,
    pub children_terminal: usize,
}

#[derive(Debug)]
pub enum TrackerMsg {
    /// Start tracking a dispatched composite.
    Register(Box<CompositeOrder>),
    /// A child order filled.
    ChildFilled(VenueFill),
    /// A child order failed (venue rejection or timeout).
    ChildFailed { order_id: OrderId, reason: String },
    /// A child order cancellation was confirmed.
    ChildCancelled { order_id: OrderId },
    Snapshot {
        reply: oneshot::Sender<Vec<TrackedView>>,
    },
    Shutdown,
}

struct Tracked {
    order: CompositeOrder,
    fills: HashMap<OrderId, VenueFill>,
}

impl Tracked {
    fn is_complete(&self) -> bool {
        self.order.children.iter().all(|c| c.status.is_terminal())
    }

    fn terminal_count(&self) -> usize {
        self.order
            .children
            .iter()
            .filter(|c| c.status.is_terminal())
            .count()
    }

    fn resolve(&self) -> CompositeResolution {
        let filled_quantity = self
            .fills
            .values()
            .fold(Size::ZERO, |acc, f| acc + f.quantity);
        let total_fee: Decimal = self.fills.values().map(|f| f.fee).sum();
        let avg_price = if filled_quantity.is_zero() {
            Price::ZERO
        } else {
            let weighted: Decimal = self
                .fills
                .values()
                .map(|f| f.price.inner() * f.quantity.inner())
                .sum();
            Price::new(weighted / filled_quantity.inner())
        };
        let status = if self.fills.is_empty() {
            ResolutionStatus::Failed
        } else if self.fills.len() == self.order.children.len() {
            ResolutionStatus::Filled
        } else {
            ResolutionStatus::Partial
        };

        CompositeResolution {
            composite_id: self.order.composite_id,
            slot_id: self.order.slot_id,
            reservation_id: self.order.reservation_id,
            symbol: self.order.symbol.clone(),
            side: self.order.side,
            status,
            filled_quantity,
            avg_price,
            total_fee,
            resolved_at: Utc::now(),
        }
    }
}

pub struct ExecutionTrackerTask {
    rx: mpsc::Receiver<TrackerMsg>,
    bus: EventBus,
    resolutions: mpsc::Sender<CompositeResolution>,
    /// In-flight composites, keyed by composite id.
    tracked: HashMap<CompositeId, Tracked>,
    /// Child order id -> owning composite, for event routing.
    index: HashMap<OrderId, CompositeId>,
    /// Recently resolved composites, for duplicate-registration checks.
    /// Bounded so the set does not grow for the life of the process.
    resolved: RecentSet<CompositeId>,
}

impl ExecutionTrackerTask {
    pub async fn run(mut self) {
        info!("execution tracker started");
        while let Some(msg) = self.rx.recv().await {
            match msg {
                TrackerMsg::Register(order) => self.on_register(*order),
                TrackerMsg::ChildFilled(fill) => {
                    self.on_child_event(fill.order_id.clone(), ChildStatus::Filled, Some(fill))
                        .await
                }
                TrackerMsg::ChildFailed { order_id, reason } => {
                    debug!(%order_id, %reason, "child order failed");
                    self.on_child_event(order_id, ChildStatus::Failed, None).await
                }
                TrackerMsg::ChildCancelled { order_id } => {
                    self.on_child_event(order_id, ChildStatus::Cancelled, None)
                        .await
                }
                TrackerMsg::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                TrackerMsg::Shutdown => break,
            }
        }
        info!("execution tracker stopped");
    }

    fn on_register(&mut self, order: CompositeOrder) {
        if self.resolved.contains(&order.composite_id)
            || self.tracked.contains_key(&order.composite_id)
        {
            warn!(composite_id = %order.composite_id, "duplicate composite registration dropped");
            return;
        }
        debug!(
            composite_id = %order.composite_id,
            children = order.children.len(),
            "tracking composite"
        );
        for child in &order.children {
            self.index
                .insert(child.order_id.clone(), order.composite_id);
        }
        self.tracked.insert(
            order.composite_id,
            Tracked {
                order,
                fills: HashMap::new(),
            },
        );
    }

    async fn on_child_event(
        &mut self,
        order_id: OrderId,
        status: ChildStatus,
        fill: Option<VenueFill>,
    ) {
        let Some(&composite_id) = self.index.get(&order_id) else {
            warn!(%order_id, "event for untracked order dropped");
            return;
        };
        let Some(tracked) = self.tracked.get_mut(&composite_id) else {
            debug!(%order_id, %composite_id, "event for resolved composite dropped");
            return;
        };
        let Some(child) = tracked
            .order
            .children
            .iter_mut()
            .find(|c| c.order_id == order_id)
        else {
            warn!(%order_id, %composite_id, "order missing from tracked composite");
            return;
        };

        if child.status.is_terminal() {
            debug!(%order_id, ?status, "duplicate terminal event dropped");
            return;
        }
        child.status = status;
        if let Some(fill) = fill {
            tracked.fills.insert(order_id, fill);
        }

        if tracked.is_complete() {
            self.finish(composite_id).await;
        }
    }

    async fn finish(&mut self, composite_id: CompositeId) {
        let Some(tracked) = self.tracked.remove(&composite_id) else {
            return;
        };
        let resolution = tracked.resolve();
        for child in &tracked.order.children {
            self.index.remove(&child.order_id);
        }
        self.resolved.insert(composite_id);

        info!(
            %composite_id,
            status = ?resolution.status,
            filled = %resolution.filled_quantity,
            avg_price = %resolution.avg_price,
            "composite resolved"
        );
        self.bus
            .publish(EventKind::CompositeResolved(resolution.clone()));
        if self.resolutions.send(resolution).await.is_err() {
            warn!(%composite_id, "resolution consumer gone");
        }
    }

    fn snapshot(&self) -> Vec<TrackedView> {
        self.tracked
            .values()
            .map(|t| TrackedView {
                composite_id: t.order.composite_id,
                children_total: t.order.children.len(),
                children_terminal: t.terminal_count(),
            })
            .collect()
    }
}

/// Cloneable handle to the execution tracker.
#[derive(Clone)]
pub struct ExecutionTrackerHandle {
    tx: mpsc::Sender<TrackerMsg>,
}

impl ExecutionTrackerHandle {
    pub async fn register(&self, order: CompositeOrder) -> ExecutionResult<()> {
        self.send(TrackerMsg::Register(Box::new(order))).await
    }

    pub async fn child_filled(&self, fill: VenueFill) -> ExecutionResult<()> {
        self.send(TrackerMsg::ChildFilled(fill)).await
    }

    pub async fn child_failed(&self, order_id: OrderId, reason: String) -> ExecutionResult<()> {
        self.send(TrackerMsg::ChildFailed { order_id, reason }).await
    }

    pub async fn child_cancelled(&self, order_id: OrderId) -> ExecutionResult<()> {
        self.send(TrackerMsg::ChildCancelled { order_id }).await
    }

    pub async fn snapshot(&self) -> ExecutionResult<Vec<TrackedView>> {
        let (reply, rx) = oneshot::channel();
        self.send(TrackerMsg::Snapshot { reply }).await?;
        rx.await.map_err(|_| ExecutionError::ChannelClosed)
    }

    pub async fn shutdown(&self) -> ExecutionResult<()> {
        self.send(TrackerMsg::Shutdown).await
    }

    async fn send(&self, msg: TrackerMsg) -> ExecutionResult<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| ExecutionError::ChannelClosed)
    }
}

/// Spawn the execution tracker.
///
/// Returns the handle, the stream of composite resolutions, and the task
/// join handle.
pub fn spawn_execution_tracker(
    bus: EventBus,
    capacity: usize,
) -> (
    ExecutionTrackerHandle,
    mpsc::Receiver<CompositeResolution>,
    JoinHandle<()>,
) {
    let (tx, rx) = mpsc::channel(capacity);
    let (res_tx, res_rx) = mpsc::channel(capacity);
    let task = ExecutionTrackerTask {
        rx,
        bus,
        resolutions: res_tx,
        tracked: HashMap::new(),
        index: HashMap::new(),
        resolved: RecentSet::default(),
    };
    let join = tokio::spawn(task.run());
    (ExecutionTrackerHandle { tx }, res_rx, join)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_core::{ChildOrder, OrderSide, ReservationId, SlotId, Symbol, VenueId};
    use rust_decimal_macros::dec;
    use tokio::time::{timeout, Duration};

    fn composite(children: usize) -> CompositeOrder {
        let composite_id = CompositeId::new();
        CompositeOrder {
            composite_id,
            slot_id: SlotId(0),
            reservation_id: ReservationId::new(),
            symbol: Symbol::new("BTC/USDT").unwrap(),
            side: OrderSide::Buy,
            total_amount: Size::new(Decimal::from(2 * children as i64)),
            max_slippage_pct: dec!(0.3),
            children: (0..children)
                .map(|i| {
                    ChildOrder::new(
                        composite_id,
                        VenueId::from(format!("venue-{i}").as_str()),
                        Price::new(dec!(100) + Decimal::from(i as i64)),
                        Size::new(dec!(2)),
                        dec!(0.1),
                    )
                })
                .collect(),
            created_at: Utc::now(),
        }
    }

    fn fill_for(child: &ChildOrder) -> VenueFill {
        VenueFill {
            order_id: child.order_id.clone(),
            price: child.price,
            quantity: child.quantity,
            fee: child.fee,
        }
    }

    async fn next_resolution(
        rx: &mut mpsc::Receiver<CompositeResolution>,
    ) -> CompositeResolution {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("resolution within deadline")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_all_children_filled_resolves_filled() {
        let (handle, mut resolutions, _join) =
            spawn_execution_tracker(EventBus::new(16), 16);
        let order = composite(2);
        handle.register(order.clone()).await.unwrap();

        handle.child_filled(fill_for(&order.children[0])).await.unwrap();
        handle.child_filled(fill_for(&order.children[1])).await.unwrap();

        let resolution = next_resolution(&mut resolutions).await;
        assert_eq!(resolution.composite_id, order.composite_id);
        assert_eq!(resolution.status, ResolutionStatus::Filled);
        assert_eq!(resolution.filled_quantity, Size::new(dec!(4)));
        // VWAP of 2 @ 100 and 2 @ 101.
        assert_eq!(resolution.avg_price, Price::new(dec!(100.5)));
        assert_eq!(resolution.total_fee, dec!(0.2));
    }

    #[tokio::test]
    async fn test_partial_fill_resolves_partial() {
        let (handle, mut resolutions, _join) =
            spawn_execution_tracker(EventBus::new(16), 16);
        let order = composite(2);
        handle.register(order.clone()).await.unwrap();

        handle.child_filled(fill_for(&order.children[0])).await.unwrap();
        handle
            .child_failed(
                order.children[1].order_id.clone(),
                "venue rejected".to_string(),
            )
            .await
            .unwrap();

        let resolution = next_resolution(&mut resolutions).await;
        assert_eq!(resolution.status, ResolutionStatus::Partial);
        assert_eq!(resolution.filled_quantity, Size::new(dec!(2)));
        assert_eq!(resolution.avg_price, Price::new(dec!(100)));
    }

    #[tokio::test]
    async fn test_all_failed_resolves_failed_with_zero_price() {
        let (handle, mut resolutions, _join) =
            spawn_execution_tracker(EventBus::new(16), 16);
        let order = composite(2);
        handle.register(order.clone()).await.unwrap();

        for child in &order.children {
            handle
                .child_failed(child.order_id.clone(), "timeout".to_string())
                .await
                .unwrap();
        }

        let resolution = next_resolution(&mut resolutions).await;
        assert_eq!(resolution.status, ResolutionStatus::Failed);
        assert!(resolution.filled_quantity.is_zero());
        assert_eq!(resolution.avg_price, Price::ZERO);
    }

    #[tokio::test]
    async fn test_duplicate_fill_is_idempotent() {
        let (handle, mut resolutions, _join) =
            spawn_execution_tracker(EventBus::new(16), 16);
        let order = composite(2);
        handle.register(order.clone()).await.unwrap();

        // Same fill delivered twice; quantity must not double-count and
        // the composite must not resolve early.
        handle.child_filled(fill_for(&order.children[0])).await.unwrap();
        handle.child_filled(fill_for(&order.children[0])).await.unwrap();
        handle.child_filled(fill_for(&order.children[1])).await.unwrap();

        let resolution = next_resolution(&mut resolutions).await;
        assert_eq!(resolution.filled_quantity, Size::new(dec!(4)));

        // Exactly one resolution.
        assert!(
            timeout(Duration::from_millis(100), resolutions.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_cancelled_child_counts_terminal() {
        let (handle, mut resolutions, _join) =
            spawn_execution_tracker(EventBus::new(16), 16);
        let order = composite(2);
        handle.register(order.clone()).await.unwrap();

        handle.child_filled(fill_for(&order.children[0])).await.unwrap();
        handle
            .child_cancelled(order.children[1].order_id.clone())
            .await
            .unwrap();

        let resolution = next_resolution(&mut resolutions).await;
        assert_eq!(resolution.status, ResolutionStatus::Partial);
    }

    #[tokio::test]
    async fn test_resolved_composite_cannot_reregister() {
        let (handle, mut resolutions, _join) =
            spawn_execution_tracker(EventBus::new(16), 16);
        let order = composite(1);
        handle.register(order.clone()).await.unwrap();
        handle.child_filled(fill_for(&order.children[0])).await.unwrap();
        let _ = next_resolution(&mut resolutions).await;

        // Re-registering the same composite id is dropped; its child
        // events can no longer produce a second resolution.
        handle.register(order.clone()).await.unwrap();
        handle.child_filled(fill_for(&order.children[0])).await.unwrap();
        assert!(
            timeout(Duration::from_millis(100), resolutions.recv())
                .await
                .is_err()
        );
        assert!(handle.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_untracked_order_event_ignored() {
        let (handle, mut resolutions, _join) =
            spawn_execution_tracker(EventBus::new(16), 16);
        handle
            .child_failed(OrderId::new(), "stray".to_string())
            .await
            .unwrap();

        assert!(
            timeout(Duration::from_millis(100), resolutions.recv())
                .await
                .is_err()
        );
        assert!(handle.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_reports_progress() {
        let (handle, _resolutions, _join) =
            spawn_execution_tracker(EventBus::new(16), 16);
        let order = composite(3);
        handle.register(order.clone()).await.unwrap();
        handle.child_filled(fill_for(&order.children[0])).await.unwrap();

        let views = handle.snapshot().await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].children_total, 3);
        assert_eq!(views[0].children_terminal, 1);
    }

    #[tokio::test]
    async fn test_resolved_event_published_on_bus() {
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let (handle, mut resolutions, _join) = spawn_execution_tracker(bus, 16);
        let order = composite(1);
        handle.register(order.clone()).await.unwrap();
        handle.child_filled(fill_for(&order.children[0])).await.unwrap();
        let _ = next_resolution(&mut resolutions).await;

        let event = timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event.kind, EventKind::CompositeResolved(_)));
    }
}
