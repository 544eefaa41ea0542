#![forbid(unsafe_code)]

//! HTTP gateway: keeps the provider credentials server-side and serves the
//! active-batch location feed.

pub mod http;
pub mod source;

pub use http::{router, ApiError};
pub use source::{FileSnapshotSource, MemorySnapshotSource, SnapshotSource, SourceError};
