use thiserror::Error;

use crate::session::SessionState;

/// Failure to obtain a provider access token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Credentials are absent. Fatal to session start.
    #[error("server misconfigured: {0}")]
    Config(String),
    /// The exchange was rejected or could not complete. `status` is `None` when
    /// no HTTP response was received.
    #[error("token exchange failed: {message}")]
    Provider {
        status: Option<u16>,
        message: String,
    },
}

impl AuthError {
    pub(crate) fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Provider {
            status,
            message: message.into(),
        }
    }
}

/// Which stage of a feed fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedErrorKind {
    /// Connection, timeout or body transfer failure.
    Network,
    /// Response body is not a valid location feed.
    Decode,
    /// Backend answered with a non-success status.
    Server,
}

/// Non-fatal failure of one feed fetch; the previous render stays on screen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("feed fetch failed ({kind:?}): {message}")]
pub struct FeedFetchError {
    pub kind: FeedErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl FeedFetchError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: FeedErrorKind::Network,
            status: None,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: FeedErrorKind::Decode,
            status: None,
            message: message.into(),
        }
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: FeedErrorKind::Server,
            status: Some(status),
            message: message.into(),
        }
    }
}

/// The map surface cannot take drawing calls. Requires re-initialization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("map surface unavailable: {0}")]
    SurfaceUnavailable(String),
    #[error("map surface already destroyed")]
    Destroyed,
}

/// Errors surfaced by [`crate::session::MapSession`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Feed(#[from] FeedFetchError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("cannot {op} while session is {state:?}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },
}
