//! Append-only engine event stream.
//!
//! Every externally observable decision (round outcomes, slot transitions,
//! routing results) is published here for audit, persistence, and
//! dashboards. Events carry monotonically increasing ids so downstream
//! consumers can deduplicate.

use crate::decimal::{Price, Size};
use crate::ids::{CompositeId, OrderId, RoundId, SlotId};
use crate::market::{ExecMode, Symbol};
use crate::order::CompositeResolution;
use crate::signal::Action;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Event payload published on the engine bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A consensus round closed and its signal set was frozen.
    RoundClosed {
        round_id: RoundId,
        symbol: Symbol,
        signal_count: usize,
    },
    /// The consensus engine produced a verdict for a closed round.
    ConsensusReached {
        round_id: RoundId,
        symbol: Symbol,
        action: Action,
        alignment: Decimal,
        confidence: Decimal,
        size: Size,
    },
    /// The risk gate vetoed a round. Final for that round.
    Vetoed {
        round_id: RoundId,
        symbol: Symbol,
        reason: String,
    },
    /// A slot moved between lifecycle states.
    SlotTransition {
        slot_id: SlotId,
        from: String,
        to: String,
    },
    /// The router accepted a plan and emitted child orders.
    PlanAccepted {
        composite_id: CompositeId,
        symbol: Symbol,
        venue_count: usize,
        expected_avg_price: Price,
        total_fee: Decimal,
    },
    /// The router rejected a plan outright.
    PlanRejected { symbol: Symbol, reason: String },
    /// Exactly-once terminal outcome of a composite order.
    CompositeResolved(CompositeResolution),
    /// An exit fill was recorded against an open position.
    PositionClosed {
        slot_id: SlotId,
        symbol: Symbol,
        trigger: String,
        realized_pnl: Decimal,
    },
    /// Best-effort cancellation was requested for a child order.
    OrderCancelRequested { order_id: OrderId },
    /// Kill switch state changed.
    KillSwitch { engaged: bool },
    /// A slot was frozen or unfrozen by an operator.
    SlotFrozen { slot_id: SlotId },
    SlotUnfrozen { slot_id: SlotId },
    /// A slot was halted after a consistency violation. Manual inspection
    /// required; the slot takes no further automatic transitions.
    SlotHalted { slot_id: SlotId, reason: String },
    /// Execution mode switched (shadow/paper/live).
    ModeChanged { mode: ExecMode },
}

/// One event on the append-only stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Monotonically increasing across the process lifetime.
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
}

/// Broadcast bus for engine events.
///
/// Cloneable; all clones share the same sequence counter so ids stay
/// monotonic regardless of which component publishes.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    seq: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus with the given subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Publish an event, assigning the next sequence id.
    ///
    /// Publishing never fails: with no subscribers the event is dropped,
    /// which is acceptable for an observability stream.
    pub fn publish(&self, kind: EventKind) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let event = EngineEvent {
            seq,
            at: Utc::now(),
            kind,
        };
        trace!(seq, "publishing engine event");
        let _ = self.tx.send(event);
        seq
    }

    /// Subscribe to the stream from the current position.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_ids_monotonic() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let s1 = bus.publish(EventKind::KillSwitch { engaged: true });
        let s2 = bus.publish(EventKind::KillSwitch { engaged: false });
        assert!(s2 > s1);

        let e1 = rx.recv().await.unwrap();
        let e2 = rx.recv().await.unwrap();
        assert_eq!(e1.seq, s1);
        assert_eq!(e2.seq, s2);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new(16);
        // Must not panic or error.
        let seq = bus.publish(EventKind::KillSwitch { engaged: true });
        assert_eq!(seq, 1);
    }

    #[tokio::test]
    async fn test_clones_share_sequence() {
        let bus = EventBus::new(16);
        let clone = bus.clone();
        let s1 = bus.publish(EventKind::KillSwitch { engaged: true });
        let s2 = clone.publish(EventKind::KillSwitch { engaged: false });
        assert_eq!(s2, s1 + 1);
    }
}
