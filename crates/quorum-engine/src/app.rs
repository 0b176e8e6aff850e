//! Main engine orchestration.
//!
//! Wires the actors together and drives the decision flow:
//! signal intake -> round book -> consensus engine -> slot manager ->
//! router -> execution tracker -> back into the slot manager and risk
//! gate. The feedback path is message passing over channels, never a
//! reentrant call.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::executor::{spawn_executor, SharedMode};
use chrono::Utc;
use quorum_consensus::{ConsensusEngine, RoundBook, Verdict};
use quorum_core::{
    AgentSignal, EngineEvent, EventBus, EventKind, ExecMode, Price, ResolutionStatus, Size,
    SlotId, Symbol,
};
use quorum_execution::{spawn_execution_tracker, ExecutionTrackerHandle, TrackedView};
use quorum_risk::{
    spawn_risk_gate, ApprovalRequest, KillSwitch, RegimeState, RiskGateHandle, RiskSnapshot,
};
use quorum_router::{PaperVenue, SmartOrderRouter, VenueClient};
use quorum_slot::{spawn_slot_manager, SlotManagerHandle, SlotView};
use quorum_telemetry::{Metrics, SessionStatsReporter};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

/// Commands accepted by the engine loop: signal intake, market marks,
/// analytics feeds, and the administrative control surface.
pub enum EngineCommand {
    /// An agent signal for a symbol's open round.
    Signal { symbol: Symbol, signal: AgentSignal },
    /// A mark price tick for stop/target evaluation.
    MarkPrice { symbol: Symbol, price: Price },
    /// Regime feed update from an analytics collaborator.
    Regime(RegimeState),
    /// Engage the kill switch.
    EngageKill { reason: String },
    /// Disengage the kill switch. Manual operator action only.
    DisengageKill,
    Freeze(SlotId),
    Unfreeze(SlotId),
    /// Switch the engine-wide execution mode (shadow/paper/live).
    SetMode(ExecMode),
    /// Set or clear one slot's execution mode override.
    SetSlotMode {
        slot_id: SlotId,
        mode: Option<ExecMode>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    Shutdown,
}

/// Point-in-time engine status for the admin surface.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub mode: ExecMode,
    pub kill_switch_engaged: bool,
    pub risk: RiskSnapshot,
    pub slots: Vec<SlotView>,
    pub in_flight_composites: Vec<TrackedView>,
}

/// Cloneable handle into the running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub async fn signal(&self, symbol: Symbol, signal: AgentSignal) {
        let _ = self.tx.send(EngineCommand::Signal { symbol, signal }).await;
    }

    pub async fn mark_price(&self, symbol: Symbol, price: Price) {
        let _ = self
            .tx
            .send(EngineCommand::MarkPrice { symbol, price })
            .await;
    }

    pub async fn set_regime(&self, regime: RegimeState) {
        let _ = self.tx.send(EngineCommand::Regime(regime)).await;
    }

    pub async fn engage_kill(&self, reason: impl Into<String>) {
        let _ = self
            .tx
            .send(EngineCommand::EngageKill {
                reason: reason.into(),
            })
            .await;
    }

    pub async fn disengage_kill(&self) {
        let _ = self.tx.send(EngineCommand::DisengageKill).await;
    }

    pub async fn freeze(&self, slot_id: SlotId) {
        let _ = self.tx.send(EngineCommand::Freeze(slot_id)).await;
    }

    pub async fn unfreeze(&self, slot_id: SlotId) {
        let _ = self.tx.send(EngineCommand::Unfreeze(slot_id)).await;
    }

    pub async fn set_mode(&self, mode: ExecMode) {
        let _ = self.tx.send(EngineCommand::SetMode(mode)).await;
    }

    /// Override one slot's execution mode, or clear the override with
    /// `None` so the slot follows the engine-wide mode again.
    pub async fn set_slot_mode(&self, slot_id: SlotId, mode: Option<ExecMode>) {
        let _ = self
            .tx
            .send(EngineCommand::SetSlotMode { slot_id, mode })
            .await;
    }

    pub async fn status(&self) -> AppResult<EngineStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Status { reply })
            .await
            .map_err(|_| AppError::Shutdown)?;
        rx.await.map_err(|_| AppError::Shutdown)
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(EngineCommand::Shutdown).await;
    }
}

/// The engine application. Owns the round book and drives the control
/// loop; planning and dispatch live in the executor task.
pub struct Application {
    config: AppConfig,
    mode: SharedMode,
    bus: EventBus,
    book: RoundBook,
    engine: ConsensusEngine,
    risk: RiskGateHandle,
    slots: SlotManagerHandle,
    tracker: ExecutionTrackerHandle,
    /// Paper venue books, seeded from mark prices. Empty in live mode.
    paper_venues: Vec<Arc<PaperVenue>>,
    cmd_rx: mpsc::Receiver<EngineCommand>,
    /// Slots currently in a non-empty state, derived from transitions.
    active_slots: i64,
    stats: SessionStatsReporter,
}

impl Application {
    /// Create the engine with simulated venues (shadow and paper modes).
    ///
    /// Live mode requires real venue clients via `with_venues`.
    pub fn new(config: AppConfig) -> AppResult<(Self, EngineHandle)> {
        if config.mode == ExecMode::Live {
            return Err(AppError::Config(
                "live mode requires venue clients; use Application::with_venues".to_string(),
            ));
        }

        let paper_venues: Vec<Arc<PaperVenue>> = config
            .venues
            .iter()
            .map(|v| Arc::new(PaperVenue::new(v.name.as_str(), v.fee_pct)))
            .collect();
        let clients: Vec<Arc<dyn VenueClient>> = paper_venues
            .iter()
            .map(|v| v.clone() as Arc<dyn VenueClient>)
            .collect();

        Self::build(config, clients, paper_venues)
    }

    /// Create the engine against real venue clients (live mode).
    pub fn with_venues(
        config: AppConfig,
        clients: Vec<Arc<dyn VenueClient>>,
    ) -> AppResult<(Self, EngineHandle)> {
        Self::build(config, clients, Vec::new())
    }

    fn build(
        config: AppConfig,
        clients: Vec<Arc<dyn VenueClient>>,
        paper_venues: Vec<Arc<PaperVenue>>,
    ) -> AppResult<(Self, EngineHandle)> {
        let capacity = config.channel_capacity;
        let bus = EventBus::new(capacity);
        let kill_switch = Arc::new(KillSwitch::new());

        let (risk, _risk_join) = spawn_risk_gate(config.risk.clone(), kill_switch, capacity);
        let (slots, exec_rx, _slot_join) =
            spawn_slot_manager(config.slots.clone(), risk.clone(), bus.clone(), capacity);
        let (tracker, resolution_rx, _tracker_join) =
            spawn_execution_tracker(bus.clone(), capacity);

        let router = Arc::new(SmartOrderRouter::new(clients, config.router.clone()));
        let engine = ConsensusEngine::new(config.consensus.clone());
        let book = RoundBook::new(chrono::Duration::milliseconds(
            config.round_window_ms as i64,
        ));
        let stats = SessionStatsReporter::new(config.symbols.clone());

        let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
        let mode = SharedMode::new(config.mode);

        let _executor_join = spawn_executor(
            exec_rx,
            resolution_rx,
            router,
            risk.clone(),
            slots.clone(),
            tracker.clone(),
            bus.clone(),
            mode.clone(),
        );

        let app = Self {
            config,
            mode,
            bus,
            book,
            engine,
            risk,
            slots,
            tracker,
            paper_venues,
            cmd_rx,
            active_slots: 0,
            stats,
        };
        Ok((app, EngineHandle { tx: cmd_tx }))
    }

    /// The engine event bus, for external consumers.
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Run the engine until shutdown.
    pub async fn run(mut self) -> AppResult<()> {
        info!(mode = %self.mode.get(), symbols = ?self.config.symbols, "Starting engine");

        let mut round_tick =
            tokio::time::interval(Duration::from_millis(self.config.round_tick_ms));
        let mut stats_tick =
            tokio::time::interval(Duration::from_secs(self.config.stats_interval_secs));
        stats_tick.tick().await; // discard the immediate first tick
        let mut events = self.bus.subscribe();

        loop {
            tokio::select! {
                Some(cmd) = self.cmd_rx.recv() => {
                    if self.on_command(cmd).await {
                        break;
                    }
                }

                _ = round_tick.tick() => {
                    for round in self.book.close_due(Utc::now()) {
                        self.on_round_closed(round).await;
                    }
                }

                _ = stats_tick.tick() => {
                    self.stats.output_summary();
                }

                event = events.recv() => {
                    match event {
                        Ok(event) => self.record_event_metrics(&event),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "event metrics lagged behind the bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => {}
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!("Final statistics summary:");
        self.stats.output_summary();

        self.slots.shutdown().await;
        let _ = self.tracker.shutdown().await;
        self.risk.shutdown().await;
        Ok(())
    }

    /// Handle a command. Returns true on shutdown.
    async fn on_command(&mut self, cmd: EngineCommand) -> bool {
        match cmd {
            EngineCommand::Signal { symbol, signal } => {
                if let Err(err) = self.book.record(symbol.clone(), signal) {
                    debug!(%symbol, %err, "signal rejected");
                }
            }
            EngineCommand::MarkPrice { symbol, price } => {
                self.seed_paper_quotes(&symbol, price);
                self.slots.mark_price(symbol, price).await;
            }
            EngineCommand::Regime(regime) => {
                info!(?regime, "regime update");
                self.risk.set_regime(regime).await;
            }
            EngineCommand::EngageKill { reason } => {
                self.risk.kill_switch().engage(reason);
                self.bus.publish(EventKind::KillSwitch { engaged: true });
                self.slots.kill_switch_tripped().await;
            }
            EngineCommand::DisengageKill => {
                self.risk.kill_switch().disengage();
                self.bus.publish(EventKind::KillSwitch { engaged: false });
            }
            EngineCommand::Freeze(slot_id) => {
                if let Err(err) = self.slots.freeze(slot_id).await {
                    warn!(%slot_id, %err, "freeze failed");
                }
            }
            EngineCommand::Unfreeze(slot_id) => {
                if let Err(err) = self.slots.unfreeze(slot_id).await {
                    warn!(%slot_id, %err, "unfreeze failed");
                }
            }
            EngineCommand::SetMode(mode) => {
                info!(from = %self.mode.get(), to = %mode, "execution mode switched");
                self.mode.set(mode);
                self.bus.publish(EventKind::ModeChanged { mode });
            }
            EngineCommand::SetSlotMode { slot_id, mode } => {
                if let Err(err) = self.slots.set_mode(slot_id, mode).await {
                    warn!(%slot_id, %err, "slot mode override failed");
                }
            }
            EngineCommand::Status { reply } => {
                let risk = match self.risk.snapshot().await {
                    Ok(snapshot) => snapshot,
                    Err(_) => return true,
                };
                let slots = self.slots.snapshot().await.unwrap_or_default();
                let in_flight = self.tracker.snapshot().await.unwrap_or_default();
                let _ = reply.send(EngineStatus {
                    mode: self.mode.get(),
                    kill_switch_engaged: self.risk.kill_switch().is_engaged(),
                    risk,
                    slots,
                    in_flight_composites: in_flight,
                });
            }
            EngineCommand::Shutdown => return true,
        }
        false
    }

    /// Evaluate a closed round and hand an actionable verdict to the
    /// slot pool.
    async fn on_round_closed(&mut self, round: quorum_consensus::ConsensusRound) {
        let symbol = round.symbol.clone();
        self.bus.publish(EventKind::RoundClosed {
            round_id: round.round_id,
            symbol: symbol.clone(),
            signal_count: round.signal_count(),
        });

        let verdict = self.engine.evaluate(&round);
        self.publish_verdict(&verdict);

        if !verdict.action.is_hold() {
            self.slots
                .decide(ApprovalRequest {
                    round_id: verdict.round_id,
                    symbol: symbol.clone(),
                    action: verdict.action,
                    size: verdict.size,
                    signal_count: verdict.signal_count,
                    quorum_override: verdict.single_signal_override,
                })
                .await;
        }

        // The round's outcome is final once the verdict is handed over
        // (or held); the next round for this symbol may now close.
        self.book.resolve(&symbol);
    }

    fn publish_verdict(&self, verdict: &Verdict) {
        info!(
            round_id = %verdict.round_id,
            symbol = %verdict.symbol,
            action = %verdict.action,
            alignment = %verdict.alignment,
            confidence = %verdict.confidence,
            size = %verdict.size,
            low_quorum = verdict.low_quorum,
            "consensus reached"
        );
        self.bus.publish(EventKind::ConsensusReached {
            round_id: verdict.round_id,
            symbol: verdict.symbol.clone(),
            action: verdict.action,
            alignment: verdict.alignment,
            confidence: verdict.confidence,
            size: verdict.size,
        });
    }

    fn seed_paper_quotes(&self, symbol: &Symbol, price: Price) {
        let depth = Size::new(self.config.paper_depth);
        for venue in &self.paper_venues {
            venue.set_quote(symbol.clone(), price, depth);
        }
    }

    /// Map bus events to Prometheus metrics. One central place, driven
    /// by the same stream external consumers see.
    fn record_event_metrics(&mut self, event: &EngineEvent) {
        match &event.kind {
            EventKind::RoundClosed {
                symbol,
                signal_count,
                ..
            } => Metrics::round_closed(symbol.as_str(), *signal_count),
            EventKind::ConsensusReached {
                symbol,
                action,
                alignment,
                ..
            } => {
                Metrics::verdict(symbol.as_str(), &action.to_string());
                if !action.is_hold() {
                    Metrics::alignment_observed(symbol.as_str(), decimal_f64(*alignment));
                }
            }
            EventKind::Vetoed { symbol, reason, .. } => {
                Metrics::vetoed(reason, symbol.as_str());
            }
            EventKind::SlotTransition { from, to, .. } => {
                Metrics::slot_transition(from, to);
                let (from, to) = (from.as_str(), to.as_str());
                if from == "EMPTY" && to != "EMPTY" {
                    self.active_slots += 1;
                } else if from != "EMPTY" && to == "EMPTY" {
                    self.active_slots = (self.active_slots - 1).max(0);
                }
                Metrics::slots_active(self.active_slots);
            }
            EventKind::PlanRejected { reason, .. } => {
                Metrics::plan_rejected(reason);
            }
            EventKind::CompositeResolved(resolution) => {
                let status = match resolution.status {
                    ResolutionStatus::Filled => "filled",
                    ResolutionStatus::Partial => "partial",
                    ResolutionStatus::Failed => "failed",
                };
                Metrics::composite_resolved(status);
            }
            EventKind::PositionClosed {
                symbol,
                trigger,
                realized_pnl,
                ..
            } => {
                Metrics::trade_pnl(symbol.as_str(), trigger, decimal_f64(*realized_pnl));
            }
            EventKind::KillSwitch { engaged } => {
                Metrics::kill_switch(*engaged);
            }
            _ => {}
        }
    }
}

pub(crate) fn decimal_f64(value: Decimal) -> f64 {
    value.to_string().parse().unwrap_or(0.0)
}
