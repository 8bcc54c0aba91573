use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Why an instance changed state; recorded on every audit row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    UserRequest,
    PaymentSucceeded,
    EntitlementRevoked,
    IdleTimeout,
    AutoHeal,
    ReadyTimeout,
    SpawnFailed,
    ProcessExited,
    HeartbeatMissed,
    StartCancelled,
    AdminDisable,
    AdminEnable,
    Resync,
    Shutdown,
}

impl TransitionCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionCause::UserRequest => "user_request",
            TransitionCause::PaymentSucceeded => "payment_succeeded",
            TransitionCause::EntitlementRevoked => "entitlement_revoked",
            TransitionCause::IdleTimeout => "idle_timeout",
            TransitionCause::AutoHeal => "auto_heal",
            TransitionCause::ReadyTimeout => "ready_timeout",
            TransitionCause::SpawnFailed => "spawn_failed",
            TransitionCause::ProcessExited => "process_exited",
            TransitionCause::HeartbeatMissed => "heartbeat_missed",
            TransitionCause::StartCancelled => "start_cancelled",
            TransitionCause::AdminDisable => "admin_disable",
            TransitionCause::AdminEnable => "admin_enable",
            TransitionCause::Resync => "resync",
            TransitionCause::Shutdown => "shutdown",
        }
    }

    pub fn is_crash(&self) -> bool {
        matches!(
            self,
            TransitionCause::ReadyTimeout
                | TransitionCause::SpawnFailed
                | TransitionCause::ProcessExited
                | TransitionCause::HeartbeatMissed
        )
    }
}

impl Display for TransitionCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
