//! Risk gating for the quorum trading engine.
//!
//! One actor owns all mutable risk state; approvals, venue commits, and
//! releases are serialized through its message loop. The kill switch is a
//! shared latch checked synchronously by every component that can start a
//! transition.

pub mod error;
pub mod gate;
pub mod kill;
pub mod state;

pub use error::{RiskError, RiskResult, VetoReason};
pub use gate::{
    spawn_risk_gate, Approval, ApprovalRequest, RegimeState, RiskConfig, RiskGateHandle,
    RiskGateTask, RiskSnapshot, ThrottlePolicy,
};
pub use kill::KillSwitch;
pub use state::{Released, Reservation, RiskState};
