use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::{
    domain::value_objects::{
        entitlements::GuildEntitlementRecord, enums::premium_plans::PremiumPlan,
    },
    infra::db::postgres::schema::guilds,
};

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = guilds)]
pub struct GuildEntity {
    pub id: String,
    pub premium_plan: String,
    pub premium_slots: i32,
    pub premium_from: Option<DateTime<Utc>>,
    pub premium_to: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub total_commands: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<GuildEntity> for GuildEntitlementRecord {
    fn from(value: GuildEntity) -> Self {
        Self {
            guild_id: value.id,
            premium_plan: PremiumPlan::from_str(&value.premium_plan),
            premium_slots: value.premium_slots,
            premium_from: value.premium_from,
            premium_to: value.premium_to,
        }
    }
}
