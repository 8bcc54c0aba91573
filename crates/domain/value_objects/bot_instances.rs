use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{
    enums::bot_statuses::BotStatus,
    plans::{Capability, FeatureCeiling},
};

pub const DEFAULT_BOT_NAME: &str = "Music Bot";

/// Discord bot token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct BotToken(String);

impl BotToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BotToken([redacted])")
    }
}

impl fmt::Display for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

/// Handle of a spawned worker as known to the process manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessRef {
    pub pid: u32,
    pub name: String,
}

impl ProcessRef {
    pub fn process_name(account_id: Uuid) -> String {
        format!("bot-{account_id}")
    }
}

/// What the store knows about one bot instance, plus its optimistic concurrency token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub bot_token: BotToken,
    pub application_id: String,
    pub bot_name: Option<String>,
    pub bot_activity: Option<String>,
    pub status: BotStatus,
    pub process_ref: Option<ProcessRef>,
    pub default_volume: i32,
    pub enable_247: bool,
    pub enable_autoplay: bool,
    /// Owner asked for the bot to be on.
    pub wants_running: bool,
    /// Last command handled by this bot, if any.
    pub last_activity: Option<DateTime<Utc>>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl InstanceRecord {
    pub fn state_update(&self) -> InstanceStateUpdate {
        InstanceStateUpdate {
            status: self.status,
            process_ref: self.process_ref.clone(),
            wants_running: self.wants_running,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceStateUpdate {
    pub status: BotStatus,
    pub process_ref: Option<ProcessRef>,
    pub wants_running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { version: i64 },
    /// Another writer bumped the version first.
    Conflict,
}

/// Everything the process manager needs to launch one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub instance_id: Uuid,
    pub account_id: Uuid,
    pub process_name: String,
    pub bot_token: BotToken,
    pub application_id: String,
    pub bot_name: String,
    pub bot_activity: Option<String>,
    pub default_volume: u16,
    pub enable_247: bool,
    pub enable_autoplay: bool,
}

impl LaunchSpec {
    /// Builds the launch parameters, clamping runtime defaults to `ceiling`.
    pub fn for_instance(instance: &InstanceRecord, ceiling: &FeatureCeiling) -> Self {
        let bot_name = instance
            .bot_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty() && ceiling.allows(Capability::CustomName))
            .unwrap_or(DEFAULT_BOT_NAME)
            .to_string();

        Self {
            instance_id: instance.id,
            account_id: instance.account_id,
            process_name: ProcessRef::process_name(instance.account_id),
            bot_token: instance.bot_token.clone(),
            application_id: instance.application_id.clone(),
            bot_name,
            bot_activity: instance.bot_activity.clone(),
            default_volume: ceiling.clamp_volume(instance.default_volume),
            enable_247: instance.enable_247 && ceiling.allows(Capability::PersistentPresence),
            enable_autoplay: instance.enable_autoplay && ceiling.allows(Capability::Autoplay),
        }
    }

    pub fn env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("BOT_TOKEN".to_string(), self.bot_token.expose().to_string()),
            ("BOT_APPLICATION_ID".to_string(), self.application_id.clone()),
            ("BOT_USER_ID".to_string(), self.account_id.to_string()),
            ("BOT_INSTANCE_ID".to_string(), self.instance_id.to_string()),
            ("BOT_NAME".to_string(), self.bot_name.clone()),
            ("BOT_DEFAULT_VOLUME".to_string(), self.default_volume.to_string()),
            ("BOT_24_7".to_string(), self.enable_247.to_string()),
            ("BOT_AUTOPLAY".to_string(), self.enable_autoplay.to_string()),
        ];
        if let Some(activity) = &self.bot_activity {
            env.push(("BOT_ACTIVITY".to_string(), activity.clone()));
        }
        env
    }
}

/// Point-in-time view of a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessProbe {
    Alive { ready: bool, heartbeats: u64 },
    Exited { code: Option<i32> },
    /// The process manager has no record of this process.
    Unknown,
}
