use std::sync::Arc;

use axum::{Json, Router, extract::State, http::HeaderMap, routing::post};

use crate::{
    app_state::PgPaymentEvents,
    axum_http::error_responses::{AppError, authorize},
    config::config_model::DotEnvyConfig,
    usecases::payment_events::{PaymentApplied, PaymentSucceeded},
};

// Run example
//   curl -X POST "http://localhost:$SERVER_PORT_WORKER/internal/v1/payments/succeeded" \
//     -H "Authorization: Bearer $INTERNAL_API_TOKEN" \
//     -H "Content-Type: application/json" \
//     -d '{"account_id":"...","plan_id":"...","provider_payment_id":"pi_123"}'

#[derive(Clone)]
pub struct PaymentsRouteState {
    config: Arc<DotEnvyConfig>,
    usecase: Arc<PgPaymentEvents>,
}

pub fn routes(config: Arc<DotEnvyConfig>, usecase: Arc<PgPaymentEvents>) -> Router {
    Router::new()
        .route("/succeeded", post(payment_succeeded))
        .with_state(PaymentsRouteState { config, usecase })
}

pub async fn payment_succeeded(
    State(state): State<PaymentsRouteState>,
    headers: HeaderMap,
    Json(payload): Json<PaymentSucceeded>,
) -> Result<Json<PaymentApplied>, AppError> {
    authorize(&headers, state.config.internal_api.token.as_deref())?;
    Ok(Json(state.usecase.payment_succeeded(payload).await?))
}
