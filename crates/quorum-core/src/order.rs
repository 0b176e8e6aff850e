//! Composite and child order model.
//!
//! A composite order is one logical trade owned by exactly one slot
//! transition. The smart order router splits it into per-venue child
//! orders; the execution tracker folds child outcomes back into a single
//! `CompositeResolution`.

use crate::decimal::{Price, Size};
use crate::ids::{CompositeId, OrderId, ReservationId, SlotId};
use crate::market::{Symbol, VenueId};
use crate::signal::Action;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side (used when closing a position).
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Returns 1 for buy, -1 for sell (for PnL calculations).
    pub fn sign(&self) -> i8 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }

    /// Map a non-hold consensus action to an order side.
    pub fn from_action(action: Action) -> Option<Self> {
        match action {
            Action::Buy => Some(Self::Buy),
            Action::Sell => Some(Self::Sell),
            Action::Hold => None,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Lifecycle state of a child order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildStatus {
    /// Emitted but no terminal callback received yet.
    #[default]
    Pending,
    /// Filled at (or better than) the planned price.
    Filled,
    /// Venue rejected the order or the call timed out.
    Failed,
    /// Cancelled (kill switch or plan abandonment).
    Cancelled,
}

impl ChildStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One per-venue fragment of a composite order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildOrder {
    /// Unique id, used for idempotent fill/cancel callbacks.
    pub order_id: OrderId,
    /// Parent composite.
    pub composite_id: CompositeId,
    /// Execution venue.
    pub venue: VenueId,
    /// Planned limit price at that venue.
    pub price: Price,
    /// Planned quantity at that venue.
    pub quantity: Size,
    /// Fee charged by the venue for this fragment, in quote currency.
    pub fee: Decimal,
    /// Current status.
    pub status: ChildStatus,
}

impl ChildOrder {
    pub fn new(
        composite_id: CompositeId,
        venue: VenueId,
        price: Price,
        quantity: Size,
        fee: Decimal,
    ) -> Self {
        Self {
            order_id: OrderId::new(),
            composite_id,
            venue,
            price,
            quantity,
            fee,
            status: ChildStatus::Pending,
        }
    }
}

/// One logical order, owned by exactly one slot transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeOrder {
    pub composite_id: CompositeId,
    /// Slot whose transition produced this order.
    pub slot_id: SlotId,
    /// Exposure reservation to release when the composite resolves.
    pub reservation_id: ReservationId,
    pub symbol: Symbol,
    pub side: OrderSide,
    /// Total quantity requested across all venues.
    pub total_amount: Size,
    /// Maximum tolerated slippage relative to the best venue price, percent.
    pub max_slippage_pct: Decimal,
    /// Per-venue fragments, best effective price first.
    pub children: Vec<ChildOrder>,
    pub created_at: DateTime<Utc>,
}

impl CompositeOrder {
    /// Quantity planned across all children.
    pub fn planned_quantity(&self) -> Size {
        self.children
            .iter()
            .fold(Size::ZERO, |acc, c| acc + c.quantity)
    }
}

/// Terminal outcome class of a composite order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    /// Every child filled.
    Filled,
    /// Some children filled, some failed or were cancelled.
    Partial,
    /// Nothing filled.
    Failed,
}

/// The single "composite resolved" event emitted by the execution tracker.
///
/// Consumed by the slot manager (state transition) and the risk gate
/// (exposure release, loss counter). Emitted exactly once per composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeResolution {
    pub composite_id: CompositeId,
    pub slot_id: SlotId,
    pub reservation_id: ReservationId,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub status: ResolutionStatus,
    /// Total filled quantity across children.
    pub filled_quantity: Size,
    /// Volume-weighted average fill price. Zero when nothing filled.
    pub avg_price: Price,
    /// Total venue fees paid, in quote currency.
    pub total_fee: Decimal,
    pub resolved_at: DateTime<Utc>,
}

impl CompositeResolution {
    /// Fraction of the requested amount that was filled.
    pub fn fill_ratio(&self, requested: Size) -> Decimal {
        if requested.is_zero() {
            return Decimal::ZERO;
        }
        self.filled_quantity.inner() / requested.inner()
    }
}
