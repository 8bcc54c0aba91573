use std::sync::Arc;

use chrono::Utc;
use crates::domain::{
    repositories::{
        entitlements::EntitlementRepository, guild_bot_settings::GuildBotSettingsRepository,
    },
    value_objects::{guild_settings::GuildBotSettings, plans::Capability},
};
use thiserror::Error;
use tracing::{debug, info};

use crate::usecases::entitlement_engine::{EntitlementEngine, EntitlementError};

#[derive(Debug, Error)]
pub enum GuildSettingsError {
    #[error("guild not found")]
    GuildNotFound,
    #[error("invalid settings: {0}")]
    InvalidRequest(String),
    #[error("guild plan does not include bot branding")]
    FeatureNotAllowed,
    #[error("no free premium slot ({remaining} of {slots_total} remaining)")]
    QuotaExceeded { remaining: u32, slots_total: u32 },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl GuildSettingsError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            GuildSettingsError::GuildNotFound => StatusCode::NOT_FOUND,
            GuildSettingsError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GuildSettingsError::FeatureNotAllowed | GuildSettingsError::QuotaExceeded { .. } => {
                StatusCode::FORBIDDEN
            }
            GuildSettingsError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EntitlementError> for GuildSettingsError {
    fn from(err: EntitlementError) -> Self {
        match err {
            EntitlementError::GuildNotFound | EntitlementError::AccountNotFound => {
                GuildSettingsError::GuildNotFound
            }
            EntitlementError::Internal(err) => GuildSettingsError::Internal(err),
        }
    }
}

/// Gates guild bot branding behind the guild's own premium plan.
pub struct GuildSettingsUseCase<S, E>
where
    S: GuildBotSettingsRepository + Send + Sync + 'static,
    E: EntitlementRepository + Send + Sync + 'static,
{
    settings_repo: Arc<S>,
    entitlements: Arc<EntitlementEngine<E>>,
}

impl<S, E> GuildSettingsUseCase<S, E>
where
    S: GuildBotSettingsRepository + Send + Sync + 'static,
    E: EntitlementRepository + Send + Sync + 'static,
{
    pub fn new(settings_repo: Arc<S>, entitlements: Arc<EntitlementEngine<E>>) -> Self {
        Self {
            settings_repo,
            entitlements,
        }
    }

    pub async fn apply(
        &self,
        guild_id: &str,
        settings: GuildBotSettings,
    ) -> Result<GuildBotSettings, GuildSettingsError> {
        if !settings.embed_color_is_valid() {
            return Err(GuildSettingsError::InvalidRequest(
                "embed_color must look like #RRGGBB".to_string(),
            ));
        }
        let settings = settings.normalized();

        // Clearing branding is always allowed.
        if settings.is_branded() {
            // A guild's own branding occupies one of its slots; re-branding reuses it.
            let guild = self.entitlements.resolve_guild(guild_id, 0, Utc::now()).await?;
            if !guild.feature_ceiling.allows(Capability::CustomName) {
                return Err(GuildSettingsError::FeatureNotAllowed);
            }
            if guild.remaining_slots() == 0 {
                return Err(GuildSettingsError::QuotaExceeded {
                    remaining: 0,
                    slots_total: guild.slots_total,
                });
            }
        }

        self.settings_repo
            .upsert_settings(guild_id.to_string(), settings.clone())
            .await?;

        info!(
            guild_id,
            branded = settings.is_branded(),
            "guild_settings: bot settings applied"
        );
        Ok(settings)
    }

    /// Stored settings, with branding withheld once the guild's plan no longer covers it.
    pub async fn get(&self, guild_id: &str) -> Result<GuildBotSettings, GuildSettingsError> {
        let stored = self
            .settings_repo
            .get_settings(guild_id.to_string())
            .await?
            .unwrap_or_default();
        if !stored.is_branded() {
            return Ok(stored);
        }

        let allowed = match self.entitlements.resolve_guild(guild_id, 0, Utc::now()).await {
            Ok(guild) => guild.feature_ceiling.allows(Capability::CustomName),
            Err(EntitlementError::GuildNotFound) => false,
            Err(err) => return Err(err.into()),
        };
        if !allowed {
            debug!(guild_id, "guild_settings: branding withheld; plan does not cover it");
            return Ok(GuildBotSettings::default());
        }
        Ok(stored)
    }
}
