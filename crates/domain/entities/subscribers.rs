use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::{
        entitlements::EntitlementRecord, enums::premium_plans::PremiumPlan,
    },
    infra::db::postgres::schema::users,
};

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = users)]
pub struct SubscriberEntity {
    pub id: Uuid,
    pub premium_plan: String,
    pub premium_plus: bool,
    pub premium_from: Option<DateTime<Utc>>,
    pub premium_to: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = users)]
pub struct UpdatePremiumWindowEntity {
    pub premium_plan: String,
    pub premium_plus: bool,
    pub premium_from: Option<DateTime<Utc>>,
    pub premium_to: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<SubscriberEntity> for EntitlementRecord {
    fn from(value: SubscriberEntity) -> Self {
        Self {
            account_id: value.id,
            premium_plan: PremiumPlan::from_str(&value.premium_plan),
            premium_plus: value.premium_plus,
            premium_from: value.premium_from,
            premium_to: value.premium_to,
        }
    }
}

impl From<EntitlementRecord> for UpdatePremiumWindowEntity {
    fn from(value: EntitlementRecord) -> Self {
        Self {
            premium_plan: value.premium_plan.to_string(),
            premium_plus: value.premium_plus,
            premium_from: value.premium_from,
            premium_to: value.premium_to,
            updated_at: Utc::now(),
        }
    }
}
