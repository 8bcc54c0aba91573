use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::value_objects::{
    enums::premium_plans::PremiumPlan,
    plans::{FeatureCeiling, PlanTier},
};

/// Subscription facts for one account as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementRecord {
    pub account_id: Uuid,
    pub premium_plan: PremiumPlan,
    /// Legacy flag that grants the top tier independently of `premium_plan`.
    pub premium_plus: bool,
    pub premium_from: Option<DateTime<Utc>>,
    pub premium_to: Option<DateTime<Utc>>,
}

impl EntitlementRecord {
    pub fn stored_tier(&self) -> PlanTier {
        if self.premium_plus {
            PlanTier::PremiumPlus
        } else {
            self.premium_plan.tier()
        }
    }
}

/// Subscription facts for one guild as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildEntitlementRecord {
    pub guild_id: String,
    pub premium_plan: PremiumPlan,
    pub premium_slots: i32,
    pub premium_from: Option<DateTime<Utc>>,
    pub premium_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementState {
    /// Paid window is open.
    Active,
    /// Window closed; the stored plan is ignored until renewed.
    Lapsed,
    /// No window stored: perpetual free tier.
    Perpetual,
    /// Stored window is contradictory; treated as not entitled.
    Inconsistent,
}

/// Resolved entitlement of an account at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entitlement {
    pub account_id: Uuid,
    pub plan: PlanTier,
    pub state: EntitlementState,
    pub slots_total: u32,
    pub slots_used: u32,
    pub feature_ceiling: FeatureCeiling,
    pub active_until: Option<DateTime<Utc>>,
}

impl Entitlement {
    pub fn entitled(&self) -> bool {
        self.state == EntitlementState::Active && self.slots_total > 0
    }

    pub fn remaining_slots(&self) -> u32 {
        self.slots_total.saturating_sub(self.slots_used)
    }

    pub fn has_free_slot(&self) -> bool {
        self.slots_used < self.slots_total
    }
}

/// Resolved entitlement of a guild. Never grants bot-instance slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuildEntitlement {
    pub guild_id: String,
    pub plan: PlanTier,
    pub state: EntitlementState,
    pub slots_total: u32,
    pub slots_used: u32,
    pub feature_ceiling: FeatureCeiling,
    pub active_until: Option<DateTime<Utc>>,
}

impl GuildEntitlement {
    pub fn remaining_slots(&self) -> u32 {
        self.slots_total.saturating_sub(self.slots_used)
    }
}
