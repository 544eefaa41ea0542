use std::fmt;
use std::time::Duration;

use crate::error::AuthError;
use crate::surface::{LatLng, MapView};

pub const ENV_CLIENT_ID: &str = "MAP_PROVIDER_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "MAP_PROVIDER_CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "MAP_PROVIDER_REFRESH_TOKEN";
pub const ENV_TOKEN_URL: &str = "MAP_PROVIDER_TOKEN_URL";

pub const DEFAULT_TOKEN_URL: &str = "https://www.arcgis.com/sharing/rest/oauth2/token";

/// Long-lived credentials for the mapping provider's refresh-token grant.
#[derive(Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub token_url: String,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_url", &self.token_url)
            .finish()
    }
}

impl ProviderCredentials {
    /// Reads credentials from the process environment.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Reads credentials through `lookup`. Every missing or blank variable is
    /// named in the returned error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let client_id = get(ENV_CLIENT_ID);
        let client_secret = get(ENV_CLIENT_SECRET);
        let refresh_token = get(ENV_REFRESH_TOKEN);

        let missing: Vec<&str> = [
            (ENV_CLIENT_ID, client_id.is_none()),
            (ENV_CLIENT_SECRET, client_secret.is_none()),
            (ENV_REFRESH_TOKEN, refresh_token.is_none()),
        ]
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(k, _)| *k)
        .collect();

        match (client_id, client_secret, refresh_token) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Ok(Self {
                client_id,
                client_secret,
                refresh_token,
                token_url: get(ENV_TOKEN_URL).unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            }),
            _ => Err(AuthError::Config(format!("missing {}", missing.join(", ")))),
        }
    }
}

/// How long cached tokens are trusted and how often they are renewed.
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    /// Subtracted from the provider's `expires_in` when a token is stored.
    pub safety_margin: Duration,
    /// Extra margin applied when checking a cached token. The safety margin is
    /// already baked into the stored expiry, so this defaults to zero.
    pub check_margin: Duration,
    /// Period of the background refresh timer. `None` disables it; `get_token`
    /// stays correct either way.
    pub refresh_interval: Option<Duration>,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_secs(300),
            check_margin: Duration::ZERO,
            refresh_interval: Some(Duration::from_secs(55 * 60)),
        }
    }
}

/// Refresh period for a CLI value in minutes; `0` disables the timer.
pub fn period_from_minutes(minutes: u64) -> Option<Duration> {
    (minutes > 0).then(|| Duration::from_secs(minutes.saturating_mul(60)))
}

/// Settings for one map session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Gateway base URL, e.g. http://127.0.0.1:3000
    pub base_url: String,
    /// Feed poll period. `None` leaves polling to the caller.
    pub poll_interval: Option<Duration>,
    pub request_timeout: Duration,
    pub token_policy: TokenPolicy,
    pub view: MapView,
    /// Also draw origin-destination lines for active routes.
    pub draw_route_lines: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            poll_interval: Some(Duration::from_secs(30)),
            request_timeout: Duration::from_secs(15),
            token_policy: TokenPolicy::default(),
            view: MapView {
                center: LatLng {
                    lat: 20.5937,
                    lng: 78.9629,
                },
                zoom: 5,
            },
            draw_route_lines: false,
        }
    }
}
