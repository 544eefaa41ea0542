#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared models and pure logic for the supply-chain provenance map.

/// Gateway and provider wire bodies.
pub mod api;
/// Batches, history points, routes and weather.
pub mod model;
/// Marker and route symbology plus the legend.
pub mod symbol;

mod util;

pub use util::now_ms;
