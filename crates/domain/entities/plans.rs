use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::{
        enums::premium_plans::PremiumPlan,
        plans::{CapabilitySet, UnknownCapability},
    },
    infra::db::postgres::schema::plans,
};

#[derive(Debug, Clone)]
pub struct PlanEntity {
    pub id: Uuid,
    pub name: String,
    pub premium_plan: PremiumPlan,
    pub price_minor: i32,
    pub duration_days: i32,
    pub features: CapabilitySet,
    pub is_active: bool,
}

/// Raw row used for Diesel queries. Features stay as JSON until validated into a CapabilitySet.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = plans)]
pub struct PlanRow {
    pub id: Uuid,
    pub name: String,
    pub premium_plan: String,
    pub price_minor: i32,
    pub duration_days: i32,
    pub features: serde_json::Value,
    pub is_active: bool,
}

impl TryFrom<PlanRow> for PlanEntity {
    type Error = UnknownCapability;

    fn try_from(value: PlanRow) -> Result<Self, Self::Error> {
        let raw: Vec<String> = match value.features {
            serde_json::Value::Null => Vec::new(),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => Ok(s),
                    other => Err(UnknownCapability(other.to_string())),
                })
                .collect::<Result<_, _>>()?,
            other => return Err(UnknownCapability(other.to_string())),
        };

        Ok(Self {
            id: value.id,
            name: value.name,
            premium_plan: PremiumPlan::from_str(&value.premium_plan),
            price_minor: value.price_minor,
            duration_days: value.duration_days,
            features: CapabilitySet::parse_features(raw)?,
            is_active: value.is_active,
        })
    }
}
