//! Token exchanges: directly against the provider, or through the gateway.

use async_trait::async_trait;
use provenance_core::api::{ErrorResponse, ProviderTokenResponse, RefreshTokenResponse};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::config::ProviderCredentials;
use crate::error::AuthError;
use crate::token::{ExchangeGrant, TokenExchange};

/// OAuth refresh-token grant against the provider's token endpoint.
///
/// Credentials are resolved once at construction; if they were missing every
/// exchange fails with [`AuthError::Config`] rather than going quiet.
pub struct ProviderExchange {
    http: Client,
    creds: Result<ProviderCredentials, AuthError>,
}

impl ProviderExchange {
    pub fn new(http: Client, creds: Result<ProviderCredentials, AuthError>) -> Self {
        Self { http, creds }
    }

    pub fn from_env(http: Client) -> Self {
        Self::new(http, ProviderCredentials::from_env())
    }

    pub fn is_configured(&self) -> bool {
        self.creds.is_ok()
    }
}

#[async_trait]
impl TokenExchange for ProviderExchange {
    async fn exchange(&self) -> Result<ExchangeGrant, AuthError> {
        let creds = self.creds.as_ref().map_err(Clone::clone)?;

        let params = [
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", creds.refresh_token.as_str()),
        ];

        debug!(url = %creds.token_url, "exchanging refresh token");
        let resp = self
            .http
            .post(&creds.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::provider(None, format!("token request: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AuthError::provider(Some(status.as_u16()), format!("token body: {e}")))?;
        let body: ProviderTokenResponse = serde_json::from_str(&text).unwrap_or_default();

        if !status.is_success() {
            let message = if body.error.is_some() || body.error_description.is_some() {
                body.error_message()
            } else {
                truncate(&text)
            };
            return Err(AuthError::provider(Some(status.as_u16()), message));
        }

        match (body.access_token.as_deref(), body.expires_in) {
            (Some(token), Some(expires_in)) if !token.is_empty() => Ok(ExchangeGrant {
                access_token: token.to_string(),
                expires_in_secs: expires_in,
            }),
            (Some(token), None) if !token.is_empty() => Err(AuthError::provider(
                Some(status.as_u16()),
                "token endpoint omitted expires_in",
            )),
            _ => Err(AuthError::provider(Some(status.as_u16()), body.error_message())),
        }
    }
}

/// Body prefix the gateway puts on missing-credential errors.
const MISCONFIGURED_PREFIX: &str = "server misconfigured: ";

/// Fetches tokens from the gateway's `GET /api/refresh-token`, which holds the
/// provider credentials server-side.
pub struct GatewayExchange {
    http: Client,
    url: String,
}

impl GatewayExchange {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            url: format!("{}/api/refresh-token", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl TokenExchange for GatewayExchange {
    async fn exchange(&self) -> Result<ExchangeGrant, AuthError> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AuthError::provider(None, format!("refresh-token request: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let message = match resp.json::<ErrorResponse>().await {
                Ok(body) => body.error,
                Err(_) => status.to_string(),
            };
            // The gateway reports missing credentials as a 500 with this
            // prefix; any other failure is treated as retryable.
            let misconfigured = (status == StatusCode::INTERNAL_SERVER_ERROR)
                .then(|| message.strip_prefix(MISCONFIGURED_PREFIX))
                .flatten();
            return Err(match misconfigured {
                Some(detail) => AuthError::Config(detail.to_string()),
                None => AuthError::provider(Some(status.as_u16()), message),
            });
        }

        let body: RefreshTokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::provider(Some(status.as_u16()), format!("refresh-token decode: {e}")))?;

        Ok(ExchangeGrant {
            access_token: body.access_token,
            expires_in_secs: body.expires_in,
        })
    }
}

fn truncate(s: &str) -> String {
    const MAX: usize = 200;
    match s.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
