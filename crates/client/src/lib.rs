#![forbid(unsafe_code)]

//! Geospatial provenance overlay: token cache, location feed, symbology
//! rendering and map session lifecycle.

pub mod config;
pub mod error;
pub mod exchange;
pub mod feed;
pub mod overlay;
pub mod session;
pub mod surface;
pub mod task;
pub mod token;

pub use config::{ProviderCredentials, SessionConfig, TokenPolicy};
pub use error::{AuthError, FeedErrorKind, FeedFetchError, RenderError, SessionError};
pub use exchange::{GatewayExchange, ProviderExchange};
pub use feed::{HttpLocationFeed, LocationFeed};
pub use overlay::{OverlayOptions, OverlayRenderer};
pub use session::{MapSession, SessionState};
pub use surface::{GeoJsonSurface, Graphic, InMemorySurface, MapSurface};
pub use token::{Clock, ExchangeGrant, SystemClock, Token, TokenCache, TokenExchange};
