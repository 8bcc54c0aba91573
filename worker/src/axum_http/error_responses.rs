use axum::{
    Json,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::usecases::{
    activity_tracker::ActivityError, guild_settings::GuildSettingsError,
    orchestrator::OrchestratorError, payment_events::PaymentEventError,
};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_slots: Option<u32>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("internal API token is not configured")]
    NotConfigured,

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Payment(#[from] PaymentEventError),

    #[error(transparent)]
    GuildSettings(#[from] GuildSettingsError),

    #[error(transparent)]
    Activity(#[from] ActivityError),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Orchestrator(err) => err.status_code(),
            AppError::Payment(err) => err.status_code(),
            AppError::GuildSettings(err) => err.status_code(),
            AppError::Activity(err) => err.status_code(),
        }
    }

    fn remaining_slots(&self) -> Option<u32> {
        match self {
            AppError::Orchestrator(OrchestratorError::QuotaExceeded { remaining, .. })
            | AppError::GuildSettings(GuildSettingsError::QuotaExceeded { remaining, .. }) => {
                Some(*remaining)
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            // Don't leak internal error detail to client
            error!(error = ?self, "http: request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            message,
            remaining_slots: self.remaining_slots(),
        });

        (status, body).into_response()
    }
}

/// Checks `Authorization: Bearer <token>`. No configured token means the surface is off.
pub fn authorize(headers: &HeaderMap, expected_token: Option<&str>) -> Result<(), AppError> {
    let expected_token = expected_token.ok_or(AppError::NotConfigured)?;
    authorize_bearer(headers, expected_token).map_err(|_| AppError::Unauthorized)
}

fn authorize_bearer(headers: &HeaderMap, expected_token: &str) -> Result<(), StatusCode> {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if token == expected_token {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_must_match() {
        assert!(authorize(&headers("Bearer s3cret"), Some("s3cret")).is_ok());
        assert!(matches!(
            authorize(&headers("Bearer nope"), Some("s3cret")),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            authorize(&headers("s3cret"), Some("s3cret")),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            authorize(&HeaderMap::new(), Some("s3cret")),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn missing_token_config_disables_the_surface() {
        let err = authorize(&headers("Bearer anything"), None).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn quota_rejection_carries_remaining_slots() {
        let response = AppError::from(OrchestratorError::QuotaExceeded {
            remaining: 0,
            slots_total: 0,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], 403);
        assert_eq!(json["remaining_slots"], 0);
    }

    #[tokio::test]
    async fn internal_errors_are_not_leaked() {
        let response = AppError::from(OrchestratorError::Internal(anyhow::anyhow!(
            "connection refused to 10.0.0.3"
        )))
        .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Internal server error");
        assert!(json.get("remaining_slots").is_none());
    }
}
