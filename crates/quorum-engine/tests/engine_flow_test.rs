//! End-to-end engine flow integration tests.
//!
//! Drives the full decision path through a running engine:
//! - Signal intake through consensus to an open position (paper mode)
//! - Stop-loss exit and realized PnL feedback
//! - Shadow mode planning without execution
//! - Kill switch veto of new entries

use async_trait::async_trait;
use chrono::Utc;
use quorum_core::{
    Action, AgentId, AgentSignal, EngineEvent, EventKind, ExecMode, OrderId, OrderSide, Price,
    ResolutionStatus, Size, Symbol, Timeframe, VenueId,
};
use quorum_engine::{AppConfig, Application, EngineHandle, VenueConfig};
use quorum_router::{RouterResult, VenueClient, VenueFill, VenueQuote};
use quorum_slot::SlotState;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

fn test_config(mode: ExecMode) -> AppConfig {
    AppConfig {
        mode,
        symbols: vec!["BTC/USDT".to_string()],
        round_window_ms: 200,
        round_tick_ms: 50,
        venues: vec![
            VenueConfig {
                name: "alpha".to_string(),
                fee_pct: dec!(0.1),
            },
            VenueConfig {
                name: "beta".to_string(),
                fee_pct: dec!(0.2),
            },
        ],
        ..AppConfig::default()
    }
}

fn symbol() -> Symbol {
    Symbol::new("BTC/USDT").unwrap()
}

fn signal(agent: &str, tf: Timeframe, action: Action, confidence: &str) -> AgentSignal {
    AgentSignal::new(
        AgentId::from(agent),
        tf,
        action,
        confidence.parse().unwrap(),
        Utc::now(),
    )
    .unwrap()
}

async fn send_aligned_buys(handle: &EngineHandle) {
    for (agent, tf) in [
        ("momentum", Timeframe::M5),
        ("trend", Timeframe::H1),
        ("breakout", Timeframe::M15),
    ] {
        handle
            .signal(symbol(), signal(agent, tf, Action::Buy, "0.9"))
            .await;
    }
}

/// Poll engine status until the predicate holds or the timeout elapses.
async fn wait_for_status(
    handle: &EngineHandle,
    what: &str,
    predicate: impl Fn(&quorum_engine::EngineStatus) -> bool,
) -> quorum_engine::EngineStatus {
    let result = timeout(Duration::from_secs(3), async {
        loop {
            if let Ok(status) = handle.status().await {
                if predicate(&status) {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    match result {
        Ok(status) => status,
        Err(_) => panic!("timed out waiting for {what}"),
    }
}

/// Drain the event stream until an event matches, or time out.
async fn wait_for_event(
    events: &mut broadcast::Receiver<EngineEvent>,
    what: &str,
    predicate: impl Fn(&EventKind) -> bool,
) -> EngineEvent {
    let result = timeout(Duration::from_secs(3), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event.kind) => return event,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    panic!("event bus closed while waiting for {what}")
                }
            }
        }
    })
    .await;
    match result {
        Ok(event) => event,
        Err(_) => panic!("timed out waiting for {what}"),
    }
}

/// Aligned buy signals in paper mode must open a position, and a mark
/// price below the stop must close it with a realized loss.
#[tokio::test]
async fn test_paper_mode_opens_and_stops_out() {
    let (app, handle) = Application::new(test_config(ExecMode::Paper)).unwrap();
    let mut events = app.event_bus().subscribe();
    let engine = tokio::spawn(app.run());

    // Seed venue books before any round can close.
    handle.mark_price(symbol(), Price::new(dec!(100))).await;
    send_aligned_buys(&handle).await;

    let resolved = wait_for_event(&mut events, "entry resolution", |kind| {
        matches!(
            kind,
            EventKind::CompositeResolved(r) if r.status == ResolutionStatus::Filled
        )
    })
    .await;
    if let EventKind::CompositeResolved(resolution) = resolved.kind {
        assert_eq!(resolution.symbol, symbol());
        assert!(resolution.filled_quantity.is_positive());
        assert!(resolution.avg_price.is_positive());
    }

    let status = wait_for_status(&handle, "a slot holding the position", |s| {
        s.slots.iter().any(|slot| slot.state == SlotState::Open)
    })
    .await;
    let open_slot = status
        .slots
        .iter()
        .find(|slot| slot.state == SlotState::Open)
        .unwrap();
    assert_eq!(open_slot.symbol, Some(symbol()));

    // 2% stop loss: a 3% drop from the entry region must trigger it.
    handle.mark_price(symbol(), Price::new(dec!(97))).await;

    let closed = wait_for_event(&mut events, "position closed", |kind| {
        matches!(kind, EventKind::PositionClosed { .. })
    })
    .await;
    if let EventKind::PositionClosed {
        trigger,
        realized_pnl,
        ..
    } = closed.kind
    {
        assert_eq!(trigger, "stop_hit");
        assert!(realized_pnl.is_sign_negative(), "stop out must realize a loss");
    }

    wait_for_status(&handle, "all slots back to empty", |s| {
        s.slots.iter().all(|slot| slot.state == SlotState::Empty)
    })
    .await;

    handle.shutdown().await;
    engine.abort();
}

/// Shadow mode publishes accepted plans but never holds a position.
#[tokio::test]
async fn test_shadow_mode_plans_without_executing() {
    let (app, handle) = Application::new(test_config(ExecMode::Shadow)).unwrap();
    let mut events = app.event_bus().subscribe();
    let engine = tokio::spawn(app.run());

    handle.mark_price(symbol(), Price::new(dec!(100))).await;
    send_aligned_buys(&handle).await;

    let accepted = wait_for_event(&mut events, "plan accepted", |kind| {
        matches!(kind, EventKind::PlanAccepted { .. })
    })
    .await;
    if let EventKind::PlanAccepted {
        venue_count,
        expected_avg_price,
        ..
    } = accepted.kind
    {
        assert!(venue_count >= 1);
        assert!(expected_avg_price.is_positive());
    }

    // The synthetic resolution unwinds the slot without a fill.
    let status = wait_for_status(&handle, "slots back to empty", |s| {
        !s.slots.is_empty() && s.slots.iter().all(|slot| slot.state == SlotState::Empty)
    })
    .await;
    assert!(status.in_flight_composites.is_empty());

    handle.shutdown().await;
    engine.abort();
}

/// With the kill switch engaged, consensus still runs but every
/// approval is vetoed and no slot leaves empty.
#[tokio::test]
async fn test_kill_switch_blocks_entries() {
    let (app, handle) = Application::new(test_config(ExecMode::Paper)).unwrap();
    let mut events = app.event_bus().subscribe();
    let engine = tokio::spawn(app.run());

    handle.engage_kill("drill").await;
    wait_for_event(&mut events, "kill switch event", |kind| {
        matches!(kind, EventKind::KillSwitch { engaged: true })
    })
    .await;

    handle.mark_price(symbol(), Price::new(dec!(100))).await;
    send_aligned_buys(&handle).await;

    wait_for_event(&mut events, "veto", |kind| {
        matches!(kind, EventKind::Vetoed { .. })
    })
    .await;

    let status = handle.status().await.unwrap();
    assert!(status.kill_switch_engaged);
    assert!(status.slots.iter().all(|slot| slot.state == SlotState::Empty));

    handle.shutdown().await;
    engine.abort();
}

/// A per-slot shadow override keeps that slot's composites on paper even
/// while the engine itself runs in paper mode: plans are published, but
/// nothing fills and the slot returns to empty.
#[tokio::test]
async fn test_slot_mode_override_shadows_entries() {
    let (app, handle) = Application::new(test_config(ExecMode::Paper)).unwrap();
    let mut events = app.event_bus().subscribe();
    let engine = tokio::spawn(app.run());

    let status = handle.status().await.unwrap();
    for slot in &status.slots {
        handle.set_slot_mode(slot.id, Some(ExecMode::Shadow)).await;
    }
    wait_for_status(&handle, "overrides visible in the snapshot", |s| {
        s.slots.iter().all(|slot| slot.mode == Some(ExecMode::Shadow))
    })
    .await;

    handle.mark_price(symbol(), Price::new(dec!(100))).await;
    send_aligned_buys(&handle).await;

    wait_for_event(&mut events, "plan accepted", |kind| {
        matches!(kind, EventKind::PlanAccepted { .. })
    })
    .await;

    // The shadow unwind puts the slot back to empty; no position opens.
    let status = wait_for_status(&handle, "slots back to empty", |s| {
        !s.slots.is_empty() && s.slots.iter().all(|slot| slot.state == SlotState::Empty)
    })
    .await;
    assert!(status.in_flight_composites.is_empty());
    assert_eq!(status.mode, ExecMode::Paper, "engine-wide mode untouched");

    handle.shutdown().await;
    engine.abort();
}

/// Venue that quotes instantly but parks every submission until told
/// to finish, standing in for a venue with a slow order endpoint.
struct StallingVenue {
    release: tokio::sync::Notify,
}

#[async_trait]
impl VenueClient for StallingVenue {
    fn venue_id(&self) -> VenueId {
        VenueId::from("stalling")
    }

    async fn quote(&self, _symbol: &Symbol, _side: OrderSide) -> RouterResult<VenueQuote> {
        Ok(VenueQuote {
            venue: self.venue_id(),
            price: Price::new(dec!(100)),
            depth: Size::new(dec!(10000)),
            fee_pct: dec!(0.1),
        })
    }

    async fn submit(
        &self,
        order_id: &OrderId,
        _symbol: &Symbol,
        _side: OrderSide,
        price: Price,
        quantity: Size,
    ) -> RouterResult<VenueFill> {
        self.release.notified().await;
        Ok(VenueFill {
            order_id: order_id.clone(),
            price,
            quantity,
            fee: dec!(0),
        })
    }

    async fn cancel(&self, _order_id: &OrderId) -> RouterResult<()> {
        Ok(())
    }
}

/// A venue sitting on a submission must not stall the control loop:
/// status requests and mark prices keep flowing while the order is
/// in flight.
#[tokio::test]
async fn test_slow_venue_does_not_block_control_loop() {
    let mut config = test_config(ExecMode::Live);
    config.venues.clear();
    config.router.submit_timeout_ms = 30_000;
    let venue = Arc::new(StallingVenue {
        release: tokio::sync::Notify::new(),
    });
    let (app, handle) =
        Application::with_venues(config, vec![venue.clone() as Arc<dyn VenueClient>]).unwrap();
    let mut events = app.event_bus().subscribe();
    let engine = tokio::spawn(app.run());

    handle.mark_price(symbol(), Price::new(dec!(100))).await;
    send_aligned_buys(&handle).await;

    wait_for_event(&mut events, "plan accepted", |kind| {
        matches!(kind, EventKind::PlanAccepted { .. })
    })
    .await;

    // The submission is parked at the venue. The engine must still
    // answer within a fraction of the submit timeout.
    for _ in 0..3 {
        let status = timeout(Duration::from_millis(500), handle.status())
            .await
            .expect("status stalled behind an in-flight submission")
            .unwrap();
        assert_eq!(status.mode, ExecMode::Live);
    }

    // Let the fill land and the slot open so shutdown is clean. The
    // permit is stored if the submission has not reached the wait yet.
    venue.release.notify_one();
    wait_for_status(&handle, "position opened after release", |s| {
        s.slots.iter().any(|slot| slot.state == SlotState::Open)
    })
    .await;

    handle.shutdown().await;
    engine.abort();
}

/// A round that fails alignment produces a hold verdict and no orders.
#[tokio::test]
async fn test_split_round_holds() {
    let (app, handle) = Application::new(test_config(ExecMode::Paper)).unwrap();
    let mut events = app.event_bus().subscribe();
    let engine = tokio::spawn(app.run());

    handle.mark_price(symbol(), Price::new(dec!(100))).await;
    handle
        .signal(symbol(), signal("momentum", Timeframe::M5, Action::Buy, "0.8"))
        .await;
    handle
        .signal(symbol(), signal("trend", Timeframe::M5, Action::Sell, "0.8"))
        .await;

    let verdict = wait_for_event(&mut events, "consensus verdict", |kind| {
        matches!(kind, EventKind::ConsensusReached { .. })
    })
    .await;
    if let EventKind::ConsensusReached { action, .. } = verdict.kind {
        assert_eq!(action, Action::Hold);
    }

    let status = handle.status().await.unwrap();
    assert!(status.slots.iter().all(|slot| slot.state == SlotState::Empty));
    assert!(status.in_flight_composites.is_empty());

    handle.shutdown().await;
    engine.abort();
}
