//! Risk gate actor.
//!
//! All approval, commit, and release traffic funnels through a single
//! task that owns `RiskState`. Messages are processed sequentially, so a
//! check-and-reserve can never race another approval against the same
//! exposure headroom.
//!
//! Checks run in fixed order, short-circuiting on the first failure:
//! 1. Kill switch
//! 2. Hold action (never approved)
//! 3. Minimum signal quorum
//! 4. Consecutive-loss throttle (reject, or shrink by a factor)
//! 5. Symbol exposure cap (check and reserve, one operation)
//! 6. Volatility regime circuit breaker (reject, or shrink)

use crate::error::{RiskError, RiskResult, VetoReason};
use crate::kill::KillSwitch;
use crate::state::{Released, RiskState};
use quorum_core::{Action, ReservationId, RoundId, Size, Symbol, VenueId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Externally supplied market regime classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeState {
    #[default]
    Normal,
    HighVolatility,
}

/// What to do when a throttle or circuit breaker trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottlePolicy {
    /// Veto the request outright.
    Reject,
    /// Approve with the size multiplied by the configured factor.
    Shrink,
}

/// Risk gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Losses in a row before the throttle trips.
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
    #[serde(default = "default_loss_policy")]
    pub loss_policy: ThrottlePolicy,
    #[serde(default = "default_shrink_factor")]
    pub loss_shrink_factor: Decimal,
    #[serde(default = "default_regime_policy")]
    pub regime_policy: ThrottlePolicy,
    #[serde(default = "default_shrink_factor")]
    pub regime_shrink_factor: Decimal,
    /// Maximum notional outstanding per symbol.
    #[serde(default = "default_symbol_cap")]
    pub symbol_exposure_cap: Size,
    /// Maximum notional outstanding per venue.
    #[serde(default = "default_venue_cap")]
    pub venue_exposure_cap: Size,
    /// Minimum signals a round must carry to be eligible for approval.
    #[serde(default = "default_min_signals")]
    pub min_signals: usize,
}

fn default_max_consecutive_losses() -> u32 {
    3
}

fn default_loss_policy() -> ThrottlePolicy {
    ThrottlePolicy::Shrink
}

fn default_shrink_factor() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_regime_policy() -> ThrottlePolicy {
    ThrottlePolicy::Reject
}

fn default_symbol_cap() -> Size {
    Size::new(Decimal::new(10_000, 0))
}

fn default_venue_cap() -> Size {
    Size::new(Decimal::new(5_000, 0))
}

fn default_min_signals() -> usize {
    2
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_consecutive_losses: default_max_consecutive_losses(),
            loss_policy: default_loss_policy(),
            loss_shrink_factor: default_shrink_factor(),
            regime_policy: default_regime_policy(),
            regime_shrink_factor: default_shrink_factor(),
            symbol_exposure_cap: default_symbol_cap(),
            venue_exposure_cap: default_venue_cap(),
            min_signals: default_min_signals(),
        }
    }
}

/// A granted approval: the reservation held and the size actually
/// approved, which may be smaller than requested after throttling.
#[derive(Debug, Clone, PartialEq)]
pub struct Approval {
    pub reservation_id: ReservationId,
    pub size: Size,
}

/// Point-in-time view of risk state for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct RiskSnapshot {
    pub consecutive_losses: u32,
    pub kill_switch_engaged: bool,
    pub regime: RegimeState,
    pub open_reservations: usize,
}

/// An approval request built from a consensus verdict.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub round_id: RoundId,
    pub symbol: Symbol,
    pub action: Action,
    pub size: Size,
    pub signal_count: usize,
    /// The consensus layer certified a lone very-high-confidence signal;
    /// exempts the request from the minimum-quorum veto.
    pub quorum_override: bool,
}

enum RiskGateMsg {
    Approve {
        request: ApprovalRequest,
        reply: oneshot::Sender<RiskResult<Approval>>,
    },
    CommitVenues {
        reservation_id: ReservationId,
        split: HashMap<VenueId, Size>,
        reply: oneshot::Sender<RiskResult<()>>,
    },
    Release {
        reservation_id: ReservationId,
        reply: oneshot::Sender<RiskResult<Released>>,
    },
    RecordOutcome {
        realized_pnl: Decimal,
    },
    SetRegime(RegimeState),
    Snapshot {
        reply: oneshot::Sender<RiskSnapshot>,
    },
    Shutdown,
}

/// Risk gate actor task. Owns `RiskState`; runs until `Shutdown`.
pub struct RiskGateTask {
    rx: mpsc::Receiver<RiskGateMsg>,
    config: RiskConfig,
    state: RiskState,
    kill_switch: Arc<KillSwitch>,
    regime: RegimeState,
}

impl RiskGateTask {
    pub async fn run(mut self) {
        debug!("RiskGateTask started");

        while let Some(msg) = self.rx.recv().await {
            match msg {
                RiskGateMsg::Shutdown => {
                    debug!("RiskGateTask shutting down");
                    break;
                }
                msg => self.handle_message(msg),
            }
        }

        debug!("RiskGateTask terminated");
    }

    fn handle_message(&mut self, msg: RiskGateMsg) {
        match msg {
            RiskGateMsg::Approve { request, reply } => {
                let _ = reply.send(self.on_approve(request));
            }
            RiskGateMsg::CommitVenues {
                reservation_id,
                split,
                reply,
            } => {
                let result =
                    self.state
                        .commit_venues(reservation_id, split, self.config.venue_exposure_cap);
                let _ = reply.send(result);
            }
            RiskGateMsg::Release {
                reservation_id,
                reply,
            } => {
                let _ = reply.send(self.state.release(reservation_id));
            }
            RiskGateMsg::RecordOutcome { realized_pnl } => {
                self.state.record_outcome(realized_pnl);
            }
            RiskGateMsg::SetRegime(regime) => {
                if regime != self.regime {
                    info!(?regime, "regime changed");
                }
                self.regime = regime;
            }
            RiskGateMsg::Snapshot { reply } => {
                let _ = reply.send(RiskSnapshot {
                    consecutive_losses: self.state.consecutive_losses(),
                    kill_switch_engaged: self.kill_switch.is_engaged(),
                    regime: self.regime,
                    open_reservations: self.state.open_reservations(),
                });
            }
            RiskGateMsg::Shutdown => {}
        }
    }

    /// Run the veto chain for one request. A veto is final for the round.
    fn on_approve(&mut self, request: ApprovalRequest) -> RiskResult<Approval> {
        // Check 1: kill switch, always first.
        if self.kill_switch.is_engaged() {
            return self.veto(&request, VetoReason::KillSwitchEngaged);
        }

        // Check 2: hold is never approved.
        if request.action.is_hold() {
            return self.veto(&request, VetoReason::HoldAction);
        }

        // Check 3: minimum quorum, unless the consensus override holds.
        if request.signal_count < self.config.min_signals && !request.quorum_override {
            return self.veto(
                &request,
                VetoReason::QuorumNotMet {
                    got: request.signal_count,
                    need: self.config.min_signals,
                },
            );
        }

        // Check 4: consecutive-loss throttle.
        let mut size = request.size;
        let losses = self.state.consecutive_losses();
        if losses >= self.config.max_consecutive_losses {
            match self.config.loss_policy {
                ThrottlePolicy::Reject => {
                    return self.veto(&request, VetoReason::LossThrottle { losses });
                }
                ThrottlePolicy::Shrink => {
                    size = size * self.config.loss_shrink_factor;
                    warn!(losses, shrunk_size = %size, "loss throttle shrinking size");
                }
            }
        }

        // Check 5 + 6: exposure headroom, then regime, then reserve.
        // The headroom read and the reservation are both inside this
        // handler, so no other approval can interleave between them.
        let projected = self.state.symbol_exposure(&request.symbol) + size;
        if projected > self.config.symbol_exposure_cap {
            return self.veto(
                &request,
                VetoReason::SymbolExposureExceeded(request.symbol.clone()),
            );
        }

        if self.regime == RegimeState::HighVolatility {
            match self.config.regime_policy {
                ThrottlePolicy::Reject => {
                    return self.veto(&request, VetoReason::HighVolatility);
                }
                ThrottlePolicy::Shrink => {
                    size = size * self.config.regime_shrink_factor;
                    warn!(shrunk_size = %size, "high volatility regime shrinking size");
                }
            }
        }

        let reservation_id = self
            .state
            .check_and_reserve(&request.symbol, size, self.config.symbol_exposure_cap)
            .map_err(RiskError::Veto)?;

        trace!(
            round_id = %request.round_id,
            reservation = %reservation_id,
            %size,
            "approval granted"
        );
        Ok(Approval {
            reservation_id,
            size,
        })
    }

    fn veto(&self, request: &ApprovalRequest, reason: VetoReason) -> RiskResult<Approval> {
        debug!(
            round_id = %request.round_id,
            symbol = %request.symbol,
            %reason,
            "approval vetoed"
        );
        Err(RiskError::Veto(reason))
    }
}

/// Cloneable handle to the risk gate actor.
#[derive(Clone)]
pub struct RiskGateHandle {
    tx: mpsc::Sender<RiskGateMsg>,
    kill_switch: Arc<KillSwitch>,
}

impl RiskGateHandle {
    /// Submit a consensus verdict for approval.
    pub async fn approve(&self, request: ApprovalRequest) -> RiskResult<Approval> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RiskGateMsg::Approve { request, reply })
            .await
            .map_err(|_| RiskError::ChannelClosed)?;
        rx.await.map_err(|_| RiskError::ChannelClosed)?
    }

    /// Record the per-venue split of an accepted routing plan.
    pub async fn commit_venues(
        &self,
        reservation_id: ReservationId,
        split: HashMap<VenueId, Size>,
    ) -> RiskResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RiskGateMsg::CommitVenues {
                reservation_id,
                split,
                reply,
            })
            .await
            .map_err(|_| RiskError::ChannelClosed)?;
        rx.await.map_err(|_| RiskError::ChannelClosed)?
    }

    /// Release a reservation. Exactly-once: a repeat release returns
    /// `DoubleRelease`, which the caller must treat as a consistency
    /// violation for the owning slot.
    pub async fn release(&self, reservation_id: ReservationId) -> RiskResult<Released> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RiskGateMsg::Release {
                reservation_id,
                reply,
            })
            .await
            .map_err(|_| RiskError::ChannelClosed)?;
        rx.await.map_err(|_| RiskError::ChannelClosed)?
    }

    /// Feed a realized trade outcome into the loss counter.
    pub async fn record_outcome(&self, realized_pnl: Decimal) {
        let _ = self
            .tx
            .send(RiskGateMsg::RecordOutcome { realized_pnl })
            .await;
    }

    pub async fn set_regime(&self, regime: RegimeState) {
        let _ = self.tx.send(RiskGateMsg::SetRegime(regime)).await;
    }

    pub async fn snapshot(&self) -> RiskResult<RiskSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RiskGateMsg::Snapshot { reply })
            .await
            .map_err(|_| RiskError::ChannelClosed)?;
        rx.await.map_err(|_| RiskError::ChannelClosed)
    }

    /// The shared kill switch, for synchronous checks outside the actor.
    pub fn kill_switch(&self) -> &Arc<KillSwitch> {
        &self.kill_switch
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(RiskGateMsg::Shutdown).await;
    }
}

/// Spawn the risk gate actor.
pub fn spawn_risk_gate(
    config: RiskConfig,
    kill_switch: Arc<KillSwitch>,
    capacity: usize,
) -> (RiskGateHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity);

    let task = RiskGateTask {
        rx,
        config,
        state: RiskState::new(),
        kill_switch: kill_switch.clone(),
        regime: RegimeState::Normal,
    };
    let join = tokio::spawn(task.run());

    (RiskGateHandle { tx, kill_switch }, join)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn symbol() -> Symbol {
        Symbol::new("BTC/USDT").unwrap()
    }

    fn request(size: Decimal) -> ApprovalRequest {
        ApprovalRequest {
            round_id: RoundId::new(),
            symbol: symbol(),
            action: Action::Buy,
            size: Size::new(size),
            signal_count: 3,
            quorum_override: false,
        }
    }

    fn spawn_default() -> (RiskGateHandle, JoinHandle<()>) {
        spawn_risk_gate(RiskConfig::default(), Arc::new(KillSwitch::new()), 64)
    }

    #[tokio::test]
    async fn test_concurrent_approvals_share_headroom() {
        // $10,000 cap, two concurrent $6,000 requests: exactly one passes.
        let (handle, _join) = spawn_default();

        let h1 = handle.clone();
        let h2 = handle.clone();
        let a = tokio::spawn(async move { h1.approve(request(dec!(6000))).await });
        let b = tokio::spawn(async move { h2.approve(request(dec!(6000))).await });

        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
        let granted = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
        assert_eq!(granted, 1);

        let vetoed = [ra, rb].into_iter().find(|r| r.is_err()).unwrap();
        assert!(matches!(
            vetoed,
            Err(RiskError::Veto(VetoReason::SymbolExposureExceeded(_)))
        ));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_kill_switch_vetoes_first() {
        let kill = Arc::new(KillSwitch::new());
        let (handle, _join) = spawn_risk_gate(RiskConfig::default(), kill.clone(), 64);

        kill.engage("test");
        let result = handle.approve(request(dec!(100))).await;
        assert!(matches!(
            result,
            Err(RiskError::Veto(VetoReason::KillSwitchEngaged))
        ));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_hold_never_approved() {
        let (handle, _join) = spawn_default();

        let mut req = request(dec!(100));
        req.action = Action::Hold;
        let result = handle.approve(req).await;
        assert!(matches!(
            result,
            Err(RiskError::Veto(VetoReason::HoldAction))
        ));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_quorum_not_met() {
        let (handle, _join) = spawn_default();

        let mut req = request(dec!(100));
        req.signal_count = 1;
        let result = handle.approve(req).await;
        assert!(matches!(
            result,
            Err(RiskError::Veto(VetoReason::QuorumNotMet { got: 1, need: 2 }))
        ));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_quorum_override_bypasses_min_signals() {
        // A lone signal certified by the consensus override is approved
        // even though it sits below min_signals.
        let (handle, _join) = spawn_default();

        let mut req = request(dec!(100));
        req.signal_count = 1;
        req.quorum_override = true;
        assert!(handle.approve(req).await.is_ok());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_loss_throttle_shrinks_size() {
        let config = RiskConfig {
            max_consecutive_losses: 2,
            loss_policy: ThrottlePolicy::Shrink,
            loss_shrink_factor: dec!(0.5),
            ..Default::default()
        };
        let (handle, _join) = spawn_risk_gate(config, Arc::new(KillSwitch::new()), 64);

        handle.record_outcome(dec!(-10)).await;
        handle.record_outcome(dec!(-10)).await;

        let approval = handle.approve(request(dec!(1000))).await.unwrap();
        assert_eq!(approval.size, Size::new(dec!(500)));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_loss_throttle_rejects() {
        let config = RiskConfig {
            max_consecutive_losses: 1,
            loss_policy: ThrottlePolicy::Reject,
            ..Default::default()
        };
        let (handle, _join) = spawn_risk_gate(config, Arc::new(KillSwitch::new()), 64);

        handle.record_outcome(dec!(-10)).await;
        let result = handle.approve(request(dec!(1000))).await;
        assert!(matches!(
            result,
            Err(RiskError::Veto(VetoReason::LossThrottle { losses: 1 }))
        ));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_win_resets_throttle() {
        let config = RiskConfig {
            max_consecutive_losses: 1,
            loss_policy: ThrottlePolicy::Reject,
            ..Default::default()
        };
        let (handle, _join) = spawn_risk_gate(config, Arc::new(KillSwitch::new()), 64);

        handle.record_outcome(dec!(-10)).await;
        handle.record_outcome(dec!(20)).await;
        assert!(handle.approve(request(dec!(1000))).await.is_ok());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_high_volatility_rejects() {
        let (handle, _join) = spawn_default();

        handle.set_regime(RegimeState::HighVolatility).await;
        let result = handle.approve(request(dec!(100))).await;
        assert!(matches!(
            result,
            Err(RiskError::Veto(VetoReason::HighVolatility))
        ));

        handle.set_regime(RegimeState::Normal).await;
        assert!(handle.approve(request(dec!(100))).await.is_ok());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_release_exactly_once() {
        let (handle, _join) = spawn_default();

        let approval = handle.approve(request(dec!(6000))).await.unwrap();
        assert!(handle.release(approval.reservation_id).await.is_ok());

        let second = handle.release(approval.reservation_id).await;
        assert!(matches!(second, Err(RiskError::DoubleRelease(_))));

        // Headroom restored by the single release.
        assert!(handle.approve(request(dec!(6000))).await.is_ok());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_commit_venues_over_cap() {
        let (handle, _join) = spawn_default();

        let approval = handle.approve(request(dec!(8000))).await.unwrap();
        let split = HashMap::from([(VenueId::from("binance"), Size::new(dec!(8000)))]);
        // Default venue cap is $5000.
        let result = handle.commit_venues(approval.reservation_id, split).await;
        assert!(matches!(
            result,
            Err(RiskError::Veto(VetoReason::VenueExposureExceeded(_)))
        ));

        handle.shutdown().await;
    }
}
