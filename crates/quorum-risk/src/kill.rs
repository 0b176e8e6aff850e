//! Kill switch latch.
//!
//! Once engaged, the switch blocks every new approval and forces in-flight
//! slots to a safe state. Disengagement is a manual operator action only.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

/// Global emergency stop, shared across the gate and every slot.
///
/// Thread-safe behind `Arc<KillSwitch>`. Checked synchronously at the
/// start of every gate evaluation and every slot transition, so its
/// effect is immediate rather than round-boundary.
pub struct KillSwitch {
    engaged: AtomicBool,
    reason: RwLock<Option<String>>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self {
            engaged: AtomicBool::new(false),
            reason: RwLock::new(None),
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }

    /// Engage the switch. If already engaged, the original reason is kept.
    pub fn engage(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self
            .engaged
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.reason.write() = Some(reason.clone());
            error!(%reason, "KILL SWITCH ENGAGED");
        } else {
            warn!(new_reason = %reason, "kill switch already engaged");
        }
    }

    /// Disengage the switch. Manual operator action only.
    pub fn disengage(&self) {
        if self.is_engaged() {
            let previous = self.reason.write().take();
            self.engaged.store(false, Ordering::SeqCst);
            info!(?previous, "kill switch disengaged");
        }
    }

    pub fn reason(&self) -> Option<String> {
        if self.is_engaged() {
            self.reason.read().clone()
        } else {
            None
        }
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}
