//! Where the aggregated active-batch snapshot comes from.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use provenance_core::api::ActiveLocationsResponse;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Produces the body of `GET /api/batches/active-locations`.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    async fn active_locations(&self) -> Result<ActiveLocationsResponse, SourceError>;
}

/// Re-reads a JSON file on every request, so edits show up on the next poll.
#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshotSource {
    async fn active_locations(&self) -> Result<ActiveLocationsResponse, SourceError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|source| SourceError::Read {
            path: self.path.clone(),
            source,
        })?;
        let body: ActiveLocationsResponse =
            serde_json::from_slice(&bytes).map_err(|source| SourceError::Parse {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), batches = body.batches_data.len(), "loaded snapshot file");
        Ok(body)
    }
}

/// Snapshot held in memory and swapped wholesale.
#[derive(Debug, Default)]
pub struct MemorySnapshotSource {
    current: RwLock<ActiveLocationsResponse>,
}

impl MemorySnapshotSource {
    pub fn new(initial: ActiveLocationsResponse) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    pub fn replace(&self, next: ActiveLocationsResponse) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = next;
    }
}

#[async_trait]
impl SnapshotSource for MemorySnapshotSource {
    async fn active_locations(&self) -> Result<ActiveLocationsResponse, SourceError> {
        Ok(self.current.read().unwrap_or_else(|e| e.into_inner()).clone())
    }
}
