//! Full-replace overlay rendering.
//!
//! Every render clears the surface and rebuilds all graphics from the snapshot.
//! There is no diffing, so a batch that disappears from the feed can never
//! leave an orphaned marker behind.

use std::collections::BTreeMap;

use provenance_core::model::{BatchSnapshot, HistoryPoint, RouteSegment, Weather};
use provenance_core::symbol::{resolve_point_symbol, resolve_route_symbol, Symbol};
use tracing::debug;

use crate::error::RenderError;
use crate::surface::{Geometry, Graphic, LatLng, MapSurface, Popup};

pub const KIND_HISTORY: &str = "history";
pub const KIND_ROUTE_ENDPOINT: &str = "route-endpoint";
pub const KIND_ROUTE_LINE: &str = "route-line";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayOptions {
    /// Draw a straight origin-destination line under each route endpoint.
    pub draw_route_lines: bool,
}

/// Keeps a surface's graphics identical to the latest snapshot set.
#[derive(Debug, Default)]
pub struct OverlayRenderer {
    options: OverlayOptions,
    graphics: Vec<Graphic>,
}

impl OverlayRenderer {
    pub fn new(options: OverlayOptions) -> Self {
        Self {
            options,
            graphics: Vec::new(),
        }
    }

    /// Graphics currently on the surface.
    pub fn graphics(&self) -> &[Graphic] {
        &self.graphics
    }

    /// Clears `surface` and draws `snapshots`. Returns the number of graphics drawn.
    ///
    /// On a surface error the surface state is unknown, so the tracked set is
    /// emptied and the error returned.
    pub fn render<S>(&mut self, surface: &mut S, snapshots: &[BatchSnapshot]) -> Result<usize, RenderError>
    where
        S: MapSurface + ?Sized,
    {
        let next = build_graphics(snapshots, &self.options);
        self.graphics.clear();

        surface.clear()?;
        for g in &next {
            match g.geometry {
                Geometry::Point(_) => surface.draw_point(g)?,
                Geometry::Line(_) => surface.draw_line(g)?,
            }
        }
        surface.flush()?;

        debug!(batches = snapshots.len(), graphics = next.len(), "overlay rendered");
        self.graphics = next;
        Ok(self.graphics.len())
    }

    /// Forgets tracked graphics without touching a surface.
    pub fn reset(&mut self) {
        self.graphics.clear();
    }
}

/// Graphics for a snapshot set, in draw order: per batch, history points in
/// feed order, then one endpoint per active route (preceded by its line when
/// enabled).
pub fn build_graphics(snapshots: &[BatchSnapshot], options: &OverlayOptions) -> Vec<Graphic> {
    let mut out = Vec::new();
    for batch in snapshots {
        for (seq, point) in batch.history_points.iter().enumerate() {
            out.push(history_graphic(batch, seq, point));
        }
        for (seq, route) in batch.active_routes.iter().enumerate() {
            if options.draw_route_lines {
                out.push(route_line_graphic(batch, seq, route));
            }
            out.push(route_endpoint_graphic(batch, seq, route));
        }
    }
    out
}

fn history_graphic(batch: &BatchSnapshot, seq: usize, point: &HistoryPoint) -> Graphic {
    let mut attributes = BTreeMap::from([
        ("kind".to_string(), KIND_HISTORY.to_string()),
        ("batchId".to_string(), batch.batch_id.clone()),
        ("eventType".to_string(), point.event_type.to_string()),
        ("status".to_string(), batch.status.to_string()),
        ("sequence".to_string(), seq.to_string()),
    ]);
    if let Some(ts) = &point.timestamp {
        attributes.insert("timestamp".to_string(), ts.clone());
    }

    Graphic {
        geometry: Geometry::Point(LatLng {
            lat: point.latitude,
            lng: point.longitude,
        }),
        symbol: Symbol::Point(resolve_point_symbol(&point.event_type, &batch.status)),
        attributes,
        popup: Some(describe_point(batch, point)),
    }
}

fn route_attributes(batch: &BatchSnapshot, seq: usize, route: &RouteSegment, kind: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("kind".to_string(), kind.to_string()),
        ("batchId".to_string(), batch.batch_id.clone()),
        ("routeStatus".to_string(), route.status.to_string()),
        ("status".to_string(), batch.status.to_string()),
        ("sequence".to_string(), seq.to_string()),
    ])
}

fn route_endpoint_graphic(batch: &BatchSnapshot, seq: usize, route: &RouteSegment) -> Graphic {
    Graphic {
        geometry: Geometry::Point(LatLng {
            lat: route.destination_lat,
            lng: route.destination_lng,
        }),
        symbol: Symbol::Route(resolve_route_symbol(&route.status)),
        attributes: route_attributes(batch, seq, route, KIND_ROUTE_ENDPOINT),
        popup: Some(describe_route(batch, route)),
    }
}

fn route_line_graphic(batch: &BatchSnapshot, seq: usize, route: &RouteSegment) -> Graphic {
    Graphic {
        geometry: Geometry::Line(vec![
            LatLng {
                lat: route.origin_lat,
                lng: route.origin_lng,
            },
            LatLng {
                lat: route.destination_lat,
                lng: route.destination_lng,
            },
        ]),
        symbol: Symbol::Route(resolve_route_symbol(&route.status)),
        attributes: route_attributes(batch, seq, route, KIND_ROUTE_LINE),
        popup: None,
    }
}

/// Popup for a history point.
pub fn describe_point(batch: &BatchSnapshot, point: &HistoryPoint) -> Popup {
    let mut lines = Vec::new();
    if let Some(crop) = point.metadata_text(&["cropType", "crop_type"]) {
        lines.push(format!("Crop: {crop}"));
    }
    if let Some(product) = point.metadata_text(&["productName", "product_name"]) {
        lines.push(format!("Product: {product}"));
    }
    if let Some(location) = point.metadata_text(&["location", "locationName", "location_name"]) {
        lines.push(format!("Location: {location}"));
    }
    lines.push(format!("Coordinates: {:.5}, {:.5}", point.latitude, point.longitude));
    if let Some(ts) = &point.timestamp {
        lines.push(format!("Recorded: {ts}"));
    }
    lines.push(format!("Batch status: {}", batch.status));
    if let Some(w) = batch.weather.as_ref().and_then(describe_weather) {
        lines.push(format!("Weather: {w}"));
    }

    Popup {
        title: format!("Batch {} - {}", batch.batch_id, point.event_type.label()),
        lines,
    }
}

fn describe_route(batch: &BatchSnapshot, route: &RouteSegment) -> Popup {
    Popup {
        title: format!("Batch {} - route {}", batch.batch_id, route.status),
        lines: vec![
            format!("From: {:.5}, {:.5}", route.origin_lat, route.origin_lng),
            format!("To: {:.5}, {:.5}", route.destination_lat, route.destination_lng),
        ],
    }
}

fn describe_weather(w: &Weather) -> Option<String> {
    let mut parts = Vec::new();
    match (&w.main, &w.description) {
        (Some(m), Some(d)) => parts.push(format!("{m} ({d})")),
        (Some(s), None) | (None, Some(s)) => parts.push(s.clone()),
        (None, None) => {}
    }
    if let Some(t) = w.temperature {
        parts.push(format!("{t:.1}°C"));
    }
    if let Some(h) = w.humidity {
        parts.push(format!("{h:.0}% humidity"));
    }
    (!parts.is_empty()).then(|| parts.join(", "))
}
