use async_trait::async_trait;
use provenance_core::api::ActiveLocationsResponse;
use provenance_core::model::BatchSnapshot;
use reqwest::Client;
use tracing::debug;

use crate::error::FeedFetchError;

/// Source of the aggregated active-batch location snapshot.
///
/// No retries here: whether to keep a stale overlay or clear it is the
/// session's call.
#[async_trait]
pub trait LocationFeed: Send + Sync + 'static {
    async fn fetch_active_locations(&self) -> Result<Vec<BatchSnapshot>, FeedFetchError>;
}

/// `GET /api/batches/active-locations` over HTTP.
pub struct HttpLocationFeed {
    http: Client,
    url: String,
}

impl HttpLocationFeed {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            url: format!("{}/api/batches/active-locations", base_url.trim_end_matches('/')),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LocationFeed for HttpLocationFeed {
    async fn fetch_active_locations(&self) -> Result<Vec<BatchSnapshot>, FeedFetchError> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FeedFetchError::network(format!("request {}: {e}", self.url)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedFetchError::server(
                status.as_u16(),
                format!("{status}: {}", body.trim()),
            ));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FeedFetchError::network(format!("read body: {e}")))?;
        let parsed: ActiveLocationsResponse =
            serde_json::from_slice(&bytes).map_err(|e| FeedFetchError::decode(e.to_string()))?;

        let snapshots = parsed.into_snapshots();
        debug!(batches = snapshots.len(), "fetched active locations");
        Ok(snapshots)
    }
}
