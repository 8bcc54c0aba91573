use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    app_state::PgActivityTracker,
    axum_http::error_responses::{AppError, authorize},
    config::config_model::DotEnvyConfig,
};

#[derive(Clone)]
pub struct ActivityRouteState {
    config: Arc<DotEnvyConfig>,
    tracker: Arc<PgActivityTracker>,
}

pub fn routes(config: Arc<DotEnvyConfig>, tracker: Arc<PgActivityTracker>) -> Router {
    Router::new()
        .route("/commands", post(record_command))
        .with_state(ActivityRouteState { config, tracker })
}

#[derive(Debug, Deserialize)]
pub struct RecordCommandRequest {
    pub guild_id: String,
    /// Bot instance that handled the command, if it was a dedicated bot.
    pub instance_id: Option<Uuid>,
}

pub async fn record_command(
    State(state): State<ActivityRouteState>,
    headers: HeaderMap,
    Json(payload): Json<RecordCommandRequest>,
) -> Result<StatusCode, AppError> {
    authorize(&headers, state.config.internal_api.token.as_deref())?;
    state
        .tracker
        .record_command(&payload.guild_id, payload.instance_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
