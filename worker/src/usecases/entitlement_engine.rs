use std::sync::Arc;

use chrono::{DateTime, Utc};
use crates::domain::{
    repositories::entitlements::EntitlementRepository,
    value_objects::{
        entitlements::{
            Entitlement, EntitlementRecord, EntitlementState, GuildEntitlement,
            GuildEntitlementRecord,
        },
        plans::{FeatureCeiling, PlanTier},
    },
};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("account not found")]
    AccountNotFound,
    #[error("guild not found")]
    GuildNotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EntitlementError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            EntitlementError::AccountNotFound | EntitlementError::GuildNotFound => {
                StatusCode::NOT_FOUND
            }
            EntitlementError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn window_state(
    premium_from: Option<DateTime<Utc>>,
    premium_to: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> EntitlementState {
    match (premium_from, premium_to) {
        (Some(from), Some(to)) if to < from => EntitlementState::Inconsistent,
        (_, None) => EntitlementState::Perpetual,
        (_, Some(to)) if now < to => EntitlementState::Active,
        _ => EntitlementState::Lapsed,
    }
}

/// Pure resolution of stored premium facts. The window end is exclusive.
pub fn resolve_record(
    record: &EntitlementRecord,
    slots_used: u32,
    now: DateTime<Utc>,
) -> Entitlement {
    let state = window_state(record.premium_from, record.premium_to, now);
    let plan = match state {
        EntitlementState::Active => record.stored_tier(),
        _ => PlanTier::Free,
    };

    Entitlement {
        account_id: record.account_id,
        plan,
        state,
        slots_total: plan.bot_slots(),
        slots_used,
        feature_ceiling: plan.feature_ceiling(),
        active_until: match state {
            EntitlementState::Active => record.premium_to,
            _ => None,
        },
    }
}

pub fn resolve_guild_record(
    record: &GuildEntitlementRecord,
    slots_used: u32,
    now: DateTime<Utc>,
) -> GuildEntitlement {
    let state = window_state(record.premium_from, record.premium_to, now);
    let (plan, slots_total) = match state {
        EntitlementState::Active => (
            record.premium_plan.tier(),
            u32::try_from(record.premium_slots).unwrap_or(0),
        ),
        _ => (PlanTier::Free, 0),
    };

    GuildEntitlement {
        guild_id: record.guild_id.clone(),
        plan,
        state,
        slots_total,
        slots_used,
        feature_ceiling: plan.feature_ceiling(),
        active_until: match state {
            EntitlementState::Active => record.premium_to,
            _ => None,
        },
    }
}

/// Guild premium can only widen what the account already has.
pub fn effective_ceiling(
    account: &Entitlement,
    guild: Option<&GuildEntitlement>,
) -> FeatureCeiling {
    match guild {
        Some(guild) => account.feature_ceiling.most_generous(guild.feature_ceiling),
        None => account.feature_ceiling,
    }
}

pub struct EntitlementEngine<E>
where
    E: EntitlementRepository + Send + Sync + 'static,
{
    entitlement_repo: Arc<E>,
}

impl<E> EntitlementEngine<E>
where
    E: EntitlementRepository + Send + Sync + 'static,
{
    pub fn new(entitlement_repo: Arc<E>) -> Self {
        Self { entitlement_repo }
    }

    pub async fn resolve(
        &self,
        account_id: Uuid,
        slots_used: u32,
        now: DateTime<Utc>,
    ) -> Result<Entitlement, EntitlementError> {
        let record = self
            .entitlement_repo
            .get_account_entitlement(account_id)
            .await?
            .ok_or(EntitlementError::AccountNotFound)?;

        let entitlement = resolve_record(&record, slots_used, now);
        if entitlement.state == EntitlementState::Inconsistent {
            warn!(
                %account_id,
                premium_from = ?record.premium_from,
                premium_to = ?record.premium_to,
                "entitlement_engine: premium window ends before it starts; treating as not entitled"
            );
        } else {
            debug!(
                %account_id,
                plan = %entitlement.plan,
                state = ?entitlement.state,
                slots_used,
                "entitlement_engine: resolved account"
            );
        }
        Ok(entitlement)
    }

    pub async fn resolve_guild(
        &self,
        guild_id: &str,
        slots_used: u32,
        now: DateTime<Utc>,
    ) -> Result<GuildEntitlement, EntitlementError> {
        let record = self
            .entitlement_repo
            .get_guild_entitlement(guild_id.to_string())
            .await?
            .ok_or(EntitlementError::GuildNotFound)?;

        let entitlement = resolve_guild_record(&record, slots_used, now);
        if entitlement.state == EntitlementState::Inconsistent {
            warn!(
                guild_id,
                "entitlement_engine: guild premium window ends before it starts"
            );
        }
        Ok(entitlement)
    }
}
