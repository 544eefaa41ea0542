//! Wire types for the gateway endpoints and the mapping provider's token endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{BatchSnapshot, BatchStatus, HistoryPoint, RouteSegment, Weather};

/// `GET /api/refresh-token` success body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshTokenResponse {
    /// Bearer token for the map provider.
    pub access_token: String,
    /// Seconds until the token should no longer be used.
    pub expires_in: u64,
}

/// Error body shared by every gateway endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable failure.
    pub error: String,
}

/// Body returned by the provider's OAuth token endpoint.
///
/// Some providers answer HTTP 200 with an `error` object instead of a token,
/// so every field is optional and the caller decides what counts as success.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderTokenResponse {
    /// Present on success.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Error code or object; shape varies by provider.
    #[serde(default)]
    pub error: Option<Value>,
    /// Longer explanation accompanying `error`.
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ProviderTokenResponse {
    /// Best-effort human message for a rejected exchange.
    pub fn error_message(&self) -> String {
        if let Some(desc) = &self.error_description {
            return desc.clone();
        }
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Object(o)) => o
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(o.clone()).to_string()),
            Some(other) => other.to_string(),
            None => "token endpoint returned no access_token".to_string(),
        }
    }
}

/// `GET /api/batches/active-locations` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActiveLocationsResponse {
    /// Active batches in feed order.
    #[serde(rename = "batchesData", default)]
    pub batches_data: Vec<BatchRecord>,
}

/// One batch as the aggregation endpoint sends it: weather fields are flattened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    /// Batch identifier.
    pub batch_id: String,
    /// Lifecycle status.
    pub status: BatchStatus,
    /// Chronological stops.
    #[serde(default)]
    pub history_points: Vec<HistoryPoint>,
    /// Current shipments.
    #[serde(default)]
    pub active_routes: Vec<RouteSegment>,
    /// Degrees Celsius.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Relative humidity in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    /// Short weather condition, e.g. `Rain`.
    #[serde(rename = "weather_main", default, skip_serializing_if = "Option::is_none")]
    pub weather_main: Option<String>,
    /// Longer weather description.
    #[serde(rename = "weather_desc", default, skip_serializing_if = "Option::is_none")]
    pub weather_desc: Option<String>,
}

impl From<BatchRecord> for BatchSnapshot {
    fn from(r: BatchRecord) -> Self {
        let weather = Weather {
            temperature: r.temperature,
            humidity: r.humidity,
            main: r.weather_main,
            description: r.weather_desc,
        };
        BatchSnapshot {
            batch_id: r.batch_id,
            status: r.status,
            history_points: r.history_points,
            active_routes: r.active_routes,
            weather: (!weather.is_empty()).then_some(weather),
        }
    }
}

impl ActiveLocationsResponse {
    /// Converts the wire body into domain snapshots, preserving order.
    pub fn into_snapshots(self) -> Vec<BatchSnapshot> {
        self.batches_data.into_iter().map(BatchSnapshot::from).collect()
    }
}
