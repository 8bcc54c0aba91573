use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    app_state::PgOrchestrator,
    axum_http::error_responses::{AppError, authorize},
    config::config_model::DotEnvyConfig,
    usecases::orchestrator::ReconcileOutcome,
};

#[derive(Clone)]
pub struct AdminRouteState {
    config: Arc<DotEnvyConfig>,
    orchestrator: Arc<PgOrchestrator>,
}

pub fn routes(config: Arc<DotEnvyConfig>, orchestrator: Arc<PgOrchestrator>) -> Router {
    Router::new()
        .route("/bots/:account_id/disable", post(disable_bot))
        .route("/bots/:account_id/enable", post(enable_bot))
        .with_state(AdminRouteState {
            config,
            orchestrator,
        })
}

#[derive(Debug, Deserialize)]
pub struct DisableRequest {
    pub reason: String,
}

pub async fn disable_bot(
    State(state): State<AdminRouteState>,
    headers: HeaderMap,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<DisableRequest>,
) -> Result<Json<ReconcileOutcome>, AppError> {
    authorize(&headers, state.config.internal_api.token.as_deref())?;
    Ok(Json(
        state
            .orchestrator
            .disable(account_id, &payload.reason)
            .await?,
    ))
}

pub async fn enable_bot(
    State(state): State<AdminRouteState>,
    headers: HeaderMap,
    Path(account_id): Path<Uuid>,
) -> Result<Json<ReconcileOutcome>, AppError> {
    authorize(&headers, state.config.internal_api.token.as_deref())?;
    Ok(Json(state.orchestrator.enable(account_id).await?))
}
