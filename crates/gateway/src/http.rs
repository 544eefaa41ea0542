use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use provenance_client::{AuthError, TokenCache};
use provenance_core::api::{ActiveLocationsResponse, ErrorResponse, RefreshTokenResponse};
use thiserror::Error;

use crate::source::{SnapshotSource, SourceError};

#[derive(Clone)]
pub struct AppState {
    tokens: Arc<TokenCache>,
    source: Arc<dyn SnapshotSource>,
}

pub fn router(tokens: Arc<TokenCache>, source: Arc<dyn SnapshotSource>) -> Router {
    let state = AppState { tokens, source };
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/refresh-token", get(refresh_token))
        .route("/api/batches/active-locations", get(active_locations))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Hands out the cached provider token. Never exchanges more than once per
/// token lifetime, however many browsers ask.
async fn refresh_token(State(st): State<AppState>) -> Result<Json<RefreshTokenResponse>, ApiError> {
    let token = st.tokens.get_token().await?;
    Ok(Json(RefreshTokenResponse {
        expires_in: token.remaining_secs(st.tokens.now_ms()),
        access_token: token.value,
    }))
}

async fn active_locations(State(st): State<AppState>) -> Result<Json<ActiveLocationsResponse>, ApiError> {
    Ok(Json(st.source.active_locations().await?))
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Auth(AuthError::Config(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(AuthError::Provider { .. }) => StatusCode::BAD_GATEWAY,
            Self::Source(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!(error = %self, status = status.as_u16(), "request failed");
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
