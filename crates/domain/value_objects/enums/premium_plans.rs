use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::plans::PlanTier;

/// Stored plan marker on users and guilds.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PremiumPlan {
    #[default]
    Free,
    TrialPremium,
    Premium,
    PremiumPlus,
}

impl PremiumPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            PremiumPlan::Free => "Free",
            PremiumPlan::TrialPremium => "TrialPremium",
            PremiumPlan::Premium => "Premium",
            PremiumPlan::PremiumPlus => "PremiumPlus",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "TrialPremium" => PremiumPlan::TrialPremium,
            "Premium" => PremiumPlan::Premium,
            "PremiumPlus" => PremiumPlan::PremiumPlus,
            _ => PremiumPlan::Free,
        }
    }

    pub fn tier(&self) -> PlanTier {
        match self {
            PremiumPlan::Free => PlanTier::Free,
            PremiumPlan::TrialPremium | PremiumPlan::Premium => PlanTier::Premium,
            PremiumPlan::PremiumPlus => PlanTier::PremiumPlus,
        }
    }
}

impl Display for PremiumPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
