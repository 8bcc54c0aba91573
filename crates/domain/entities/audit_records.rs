use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::{
        bot_instances::ProcessRef,
        enums::{bot_statuses::BotStatus, transition_causes::TransitionCause},
    },
    infra::db::postgres::schema::bot_audit_records,
};

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = bot_audit_records)]
pub struct AuditRecordEntity {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub account_id: Uuid,
    pub from_status: String,
    pub to_status: String,
    pub cause: String,
    pub pid: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = bot_audit_records)]
pub struct InsertAuditRecordEntity {
    pub instance_id: Uuid,
    pub account_id: Uuid,
    pub from_status: String,
    pub to_status: String,
    pub cause: String,
    pub pid: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl InsertAuditRecordEntity {
    pub fn transition(
        instance_id: Uuid,
        account_id: Uuid,
        from: BotStatus,
        to: BotStatus,
        cause: TransitionCause,
        process_ref: Option<&ProcessRef>,
    ) -> Self {
        Self {
            instance_id,
            account_id,
            from_status: from.to_string(),
            to_status: to.to_string(),
            cause: cause.to_string(),
            pid: process_ref.and_then(|p| i32::try_from(p.pid).ok()),
            created_at: Utc::now(),
        }
    }
}

pub type NewAuditRecord = InsertAuditRecordEntity;
