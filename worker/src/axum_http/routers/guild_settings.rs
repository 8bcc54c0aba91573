use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::get,
};
use crates::domain::value_objects::guild_settings::GuildBotSettings;

use crate::{
    app_state::PgGuildSettings,
    axum_http::error_responses::{AppError, authorize},
    config::config_model::DotEnvyConfig,
};

#[derive(Clone)]
pub struct GuildSettingsRouteState {
    config: Arc<DotEnvyConfig>,
    usecase: Arc<PgGuildSettings>,
}

pub fn routes(config: Arc<DotEnvyConfig>, usecase: Arc<PgGuildSettings>) -> Router {
    Router::new()
        .route(
            "/:guild_id/bot-settings",
            get(get_bot_settings).put(apply_bot_settings),
        )
        .with_state(GuildSettingsRouteState { config, usecase })
}

pub async fn get_bot_settings(
    State(state): State<GuildSettingsRouteState>,
    headers: HeaderMap,
    Path(guild_id): Path<String>,
) -> Result<Json<GuildBotSettings>, AppError> {
    authorize(&headers, state.config.internal_api.token.as_deref())?;
    Ok(Json(state.usecase.get(&guild_id).await?))
}

pub async fn apply_bot_settings(
    State(state): State<GuildSettingsRouteState>,
    headers: HeaderMap,
    Path(guild_id): Path<String>,
    Json(payload): Json<GuildBotSettings>,
) -> Result<Json<GuildBotSettings>, AppError> {
    authorize(&headers, state.config.internal_api.token.as_deref())?;
    Ok(Json(state.usecase.apply(&guild_id, payload).await?))
}
