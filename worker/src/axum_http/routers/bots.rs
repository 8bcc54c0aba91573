use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    app_state::PgOrchestrator,
    axum_http::error_responses::{AppError, authorize},
    config::config_model::DotEnvyConfig,
    usecases::orchestrator::{InstanceStatusView, ReconcileOutcome},
};

// Run example
//   curl -X POST "http://localhost:$SERVER_PORT_WORKER/internal/v1/bots/$ACCOUNT_ID/start" \
//     -H "Authorization: Bearer $INTERNAL_API_TOKEN"

#[derive(Clone)]
pub struct BotsRouteState {
    config: Arc<DotEnvyConfig>,
    orchestrator: Arc<PgOrchestrator>,
}

pub fn routes(config: Arc<DotEnvyConfig>, orchestrator: Arc<PgOrchestrator>) -> Router {
    Router::new()
        .route("/:account_id", get(instance_status))
        .route("/:account_id/start", post(start_bot))
        .route("/:account_id/stop", post(stop_bot))
        .route("/:account_id/restart", post(restart_bot))
        .with_state(BotsRouteState {
            config,
            orchestrator,
        })
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub guild_id: Option<String>,
}

pub async fn start_bot(
    State(state): State<BotsRouteState>,
    headers: HeaderMap,
    Path(account_id): Path<Uuid>,
) -> Result<Json<ReconcileOutcome>, AppError> {
    authorize(&headers, state.config.internal_api.token.as_deref())?;
    Ok(Json(state.orchestrator.request_start(account_id).await?))
}

pub async fn stop_bot(
    State(state): State<BotsRouteState>,
    headers: HeaderMap,
    Path(account_id): Path<Uuid>,
) -> Result<Json<ReconcileOutcome>, AppError> {
    authorize(&headers, state.config.internal_api.token.as_deref())?;
    Ok(Json(state.orchestrator.request_stop(account_id).await?))
}

pub async fn restart_bot(
    State(state): State<BotsRouteState>,
    headers: HeaderMap,
    Path(account_id): Path<Uuid>,
) -> Result<Json<ReconcileOutcome>, AppError> {
    authorize(&headers, state.config.internal_api.token.as_deref())?;
    Ok(Json(state.orchestrator.request_restart(account_id).await?))
}

pub async fn instance_status(
    State(state): State<BotsRouteState>,
    headers: HeaderMap,
    Path(account_id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<InstanceStatusView>, AppError> {
    authorize(&headers, state.config.internal_api.token.as_deref())?;
    let view = state
        .orchestrator
        .status(account_id, query.guild_id.as_deref())
        .await?;
    Ok(Json(view))
}
