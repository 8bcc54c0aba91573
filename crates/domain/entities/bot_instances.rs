use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::{
        bot_instances::{BotToken, InstanceRecord, InstanceStateUpdate, ProcessRef},
        enums::bot_statuses::BotStatus,
    },
    infra::db::postgres::schema::bot_instances,
};

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = bot_instances)]
pub struct BotInstanceEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bot_token: String,
    pub application_id: String,
    pub bot_name: Option<String>,
    pub bot_activity: Option<String>,
    pub bot_status: String,
    pub pm2_process_id: Option<i32>,
    pub process_name: Option<String>,
    pub default_volume: i32,
    pub enable_247: bool,
    pub enable_autoplay: bool,
    pub wants_running: bool,
    pub last_activity: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Columns written on every lifecycle transition. `version` is bumped by the caller.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = bot_instances, treat_none_as_null = true)]
pub struct UpdateBotStateEntity {
    pub bot_status: String,
    pub pm2_process_id: Option<i32>,
    pub process_name: Option<String>,
    pub wants_running: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<InstanceStateUpdate> for UpdateBotStateEntity {
    fn from(value: InstanceStateUpdate) -> Self {
        let (pm2_process_id, process_name) = match value.process_ref {
            Some(process_ref) => (
                i32::try_from(process_ref.pid).ok(),
                Some(process_ref.name),
            ),
            None => (None, None),
        };

        Self {
            bot_status: value.status.to_string(),
            pm2_process_id,
            process_name,
            wants_running: value.wants_running,
            updated_at: Utc::now(),
        }
    }
}

impl From<BotInstanceEntity> for InstanceRecord {
    fn from(value: BotInstanceEntity) -> Self {
        // A null pid means "not currently running".
        let process_ref = value.pm2_process_id.and_then(|pid| {
            Some(ProcessRef {
                pid: u32::try_from(pid).ok()?,
                name: value
                    .process_name
                    .clone()
                    .unwrap_or_else(|| ProcessRef::process_name(value.user_id)),
            })
        });

        Self {
            id: value.id,
            account_id: value.user_id,
            bot_token: BotToken::new(value.bot_token),
            application_id: value.application_id,
            bot_name: value.bot_name,
            bot_activity: value.bot_activity,
            status: BotStatus::from_str(&value.bot_status),
            process_ref,
            default_volume: value.default_volume,
            enable_247: value.enable_247,
            enable_autoplay: value.enable_autoplay,
            wants_running: value.wants_running,
            last_activity: value.last_activity,
            version: value.version,
            updated_at: value.updated_at,
        }
    }
}
