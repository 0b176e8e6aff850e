//! Prometheus metrics for the quorum engine.
//!
//! Covers the externally observable decision flow:
//! - Round lifecycle and consensus verdicts
//! - Risk gate vetoes
//! - Slot transitions
//! - Routing and execution outcomes
//! - Realized trade PnL
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, HistogramVec,
    IntGauge,
};

/// Total consensus rounds closed.
pub static ROUNDS_CLOSED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quorum_rounds_closed_total",
        "Total consensus rounds closed",
        &["symbol"]
    )
    .unwrap()
});

/// Total consensus verdicts by resulting action.
pub static VERDICTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quorum_verdicts_total",
        "Total consensus verdicts by action",
        &["symbol", "action"]
    )
    .unwrap()
});

/// Signals per closed round.
pub static ROUND_SIGNALS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "quorum_round_signals",
        "Number of agent signals in a closed round",
        &["symbol"],
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 8.0, 10.0]
    )
    .unwrap()
});

/// Alignment distribution of actionable verdicts.
pub static CONSENSUS_ALIGNMENT: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "quorum_consensus_alignment",
        "Weighted alignment of actionable consensus verdicts",
        &["symbol"],
        vec![0.5, 0.55, 0.6, 0.65, 0.7, 0.75, 0.8, 0.85, 0.9, 0.95, 1.0]
    )
    .unwrap()
});

/// Risk gate veto count by reason.
pub static VETOES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quorum_vetoes_total",
        "Total risk gate vetoes",
        &["reason", "symbol"]
    )
    .unwrap()
});

/// Slot transition count by edge.
pub static SLOT_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quorum_slot_transitions_total",
        "Total slot state transitions",
        &["from", "to"]
    )
    .unwrap()
});

/// Slots currently holding or working a position.
pub static SLOTS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "quorum_slots_active",
        "Slots currently in a non-empty state"
    )
    .unwrap()
});

/// Routing plan rejections by reason.
pub static PLAN_REJECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quorum_plan_rejected_total",
        "Total routing plans rejected",
        &["reason"]
    )
    .unwrap()
});

/// Composite order resolutions by terminal status.
pub static COMPOSITES_RESOLVED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quorum_composites_resolved_total",
        "Total composite orders resolved",
        &["status"]
    )
    .unwrap()
});

/// Child orders by venue and terminal status.
pub static CHILD_ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quorum_child_orders_total",
        "Total child orders by venue and terminal status",
        &["venue", "status"]
    )
    .unwrap()
});

/// Fill ratio of resolved entry composites.
pub static FILL_RATIO: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "quorum_fill_ratio",
        "Filled fraction of the requested composite amount",
        &["symbol"],
        vec![0.0, 0.1, 0.25, 0.5, 0.75, 0.9, 1.0]
    )
    .unwrap()
});

/// Realized PnL per closed position, in quote currency.
pub static TRADE_PNL: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "quorum_trade_pnl",
        "Realized PnL per closed position in quote currency",
        &["symbol", "trigger"],
        vec![
            -500.0, -200.0, -100.0, -50.0, -20.0, 0.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0,
        ]
    )
    .unwrap()
});

/// Kill switch state (1 = engaged).
pub static KILL_SWITCH_ENGAGED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("quorum_kill_switch_engaged", "Kill switch state (1=engaged)").unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a closed consensus round.
    pub fn round_closed(symbol: &str, signal_count: usize) {
        ROUNDS_CLOSED_TOTAL.with_label_values(&[symbol]).inc();
        ROUND_SIGNALS
            .with_label_values(&[symbol])
            .observe(signal_count as f64);
    }

    /// Record a consensus verdict.
    pub fn verdict(symbol: &str, action: &str) {
        VERDICTS_TOTAL.with_label_values(&[symbol, action]).inc();
    }

    /// Record the alignment of an actionable verdict.
    pub fn alignment_observed(symbol: &str, alignment: f64) {
        CONSENSUS_ALIGNMENT
            .with_label_values(&[symbol])
            .observe(alignment);
    }

    /// Record a risk gate veto.
    pub fn vetoed(reason: &str, symbol: &str) {
        VETOES_TOTAL.with_label_values(&[reason, symbol]).inc();
    }

    /// Record a slot transition.
    pub fn slot_transition(from: &str, to: &str) {
        SLOT_TRANSITIONS_TOTAL.with_label_values(&[from, to]).inc();
    }

    /// Update the active slot gauge.
    pub fn slots_active(count: i64) {
        SLOTS_ACTIVE.set(count);
    }

    /// Record a rejected routing plan.
    pub fn plan_rejected(reason: &str) {
        PLAN_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record a resolved composite.
    pub fn composite_resolved(status: &str) {
        COMPOSITES_RESOLVED_TOTAL.with_label_values(&[status]).inc();
    }

    /// Record a terminal child order.
    pub fn child_order(venue: &str, status: &str) {
        CHILD_ORDERS_TOTAL.with_label_values(&[venue, status]).inc();
    }

    /// Record the fill ratio of a resolved composite.
    pub fn fill_ratio(symbol: &str, ratio: f64) {
        FILL_RATIO.with_label_values(&[symbol]).observe(ratio);
    }

    /// Record realized PnL for a closed position.
    pub fn trade_pnl(symbol: &str, trigger: &str, pnl: f64) {
        TRADE_PNL.with_label_values(&[symbol, trigger]).observe(pnl);
    }

    /// Set kill switch state.
    pub fn kill_switch(engaged: bool) {
        KILL_SWITCH_ENGAGED.set(if engaged { 1 } else { 0 });
    }
}
