use std::fmt::Display;

use uuid::Uuid;

/// Conditions that need a human; delivered over the operator channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorAlert {
    CrashLoop {
        instance_id: Uuid,
        account_id: Uuid,
        crashes: u32,
    },
    PartialFailure {
        instance_id: Uuid,
        account_id: Uuid,
        detail: String,
    },
    InstanceDisabled {
        instance_id: Uuid,
        account_id: Uuid,
        reason: String,
    },
}

impl OperatorAlert {
    pub fn kind(&self) -> &'static str {
        match self {
            OperatorAlert::CrashLoop { .. } => "crash_loop",
            OperatorAlert::PartialFailure { .. } => "partial_failure",
            OperatorAlert::InstanceDisabled { .. } => "instance_disabled",
        }
    }
}

impl Display for OperatorAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatorAlert::CrashLoop {
                instance_id,
                account_id,
                crashes,
            } => write!(
                f,
                "instance {instance_id} (account {account_id}) crashed {crashes} times in a row; auto-restart halted"
            ),
            OperatorAlert::PartialFailure {
                instance_id,
                account_id,
                detail,
            } => write!(
                f,
                "instance {instance_id} (account {account_id}) state could not be persisted: {detail}"
            ),
            OperatorAlert::InstanceDisabled {
                instance_id,
                account_id,
                reason,
            } => write!(
                f,
                "instance {instance_id} (account {account_id}) disabled: {reason}"
            ),
        }
    }
}
