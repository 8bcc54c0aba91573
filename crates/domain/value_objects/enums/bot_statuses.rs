use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a supervised bot worker, persisted as `bot_status`.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
    Disabled,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotStatus::Stopped => "stopped",
            BotStatus::Starting => "starting",
            BotStatus::Running => "running",
            BotStatus::Stopping => "stopping",
            BotStatus::Crashed => "crashed",
            BotStatus::Disabled => "disabled",
        }
    }

    /// Unknown values fall back to `Stopped`; the supervisor's view wins on the next reconcile.
    pub fn from_str(value: &str) -> Self {
        match value {
            "stopped" => BotStatus::Stopped,
            "starting" => BotStatus::Starting,
            "running" => BotStatus::Running,
            "stopping" => BotStatus::Stopping,
            "crashed" => BotStatus::Crashed,
            "disabled" => BotStatus::Disabled,
            _ => BotStatus::Stopped,
        }
    }

    /// States that hold an OS process and therefore consume a bot slot.
    pub fn occupies_slot(&self) -> bool {
        matches!(
            self,
            BotStatus::Starting | BotStatus::Running | BotStatus::Stopping
        )
    }

    pub fn is_at_rest(&self) -> bool {
        matches!(self, BotStatus::Stopped | BotStatus::Disabled)
    }
}

impl Display for BotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
