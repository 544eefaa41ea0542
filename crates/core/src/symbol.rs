//! Visual encoding of supply-chain semantics.
//!
//! Everything here is a pure lookup without I/O or hidden state. Identical inputs
//! always produce identical symbols, which keeps redraws idempotent.

use serde::{Deserialize, Serialize};

use crate::model::{BatchStatus, EventType, RouteStatus};

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
}

impl Rgb {
    /// Builds a color from channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Multiplies every channel by `factor` (clamped to `0.0..=1.0`), truncating.
    pub fn scaled(self, factor: f64) -> Self {
        let f = factor.clamp(0.0, 1.0);
        let ch = |c: u8| (f64::from(c) * f) as u8;
        Self::new(ch(self.r), ch(self.g), ch(self.b))
    }

    /// `#rrggbb`.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Farm registration.
pub const FOREST_GREEN: Rgb = Rgb::new(34, 139, 34);
/// Processor departure.
pub const ORANGE: Rgb = Rgb::new(255, 165, 0);
/// Distributor departure and warehouse arrival.
pub const DARK_BLUE: Rgb = Rgb::new(0, 0, 139);
/// Final destination; also delayed routes.
pub const RED: Rgb = Rgb::new(255, 0, 0);
/// Unrecognized events and cancelled routes.
pub const GREY: Rgb = Rgb::new(128, 128, 128);
/// Planned routes.
pub const YELLOW: Rgb = Rgb::new(255, 215, 0);
/// Routes in transit.
pub const BRIGHT_BLUE: Rgb = Rgb::new(0, 122, 255);
/// Delivered routes.
pub const DARK_GREEN: Rgb = Rgb::new(0, 100, 0);
/// Marker outline.
pub const WHITE: Rgb = Rgb::new(255, 255, 255);

/// Channel multiplier for completed intermediate stages of a delivered batch.
pub const DELIVERED_DIM_FACTOR: f64 = 0.5;

/// Point marker size in screen pixels.
pub const POINT_SIZE: f32 = 10.0;

/// Outline drawn around a marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    /// Stroke color.
    pub color: Rgb,
    /// Stroke width in pixels.
    pub width: f32,
}

/// Marker symbol for a history point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSymbol {
    /// Fill color.
    pub color: Rgb,
    /// Diameter in pixels.
    pub size: f32,
    /// Ring drawn around the fill.
    pub outline: Outline,
}

/// Stroke pattern of a route symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineStyle {
    /// Continuous stroke.
    Solid,
    /// Dashed.
    Dash,
    /// Dotted.
    Dot,
    /// Alternating dash and dot.
    DashDot,
}

/// Stroke symbol for a route (drawn at its destination endpoint, and along the
/// segment when route lines are enabled).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteSymbol {
    /// Stroke color.
    pub color: Rgb,
    /// Stroke width in pixels.
    pub width: f32,
    /// Stroke pattern.
    pub style: LineStyle,
}

/// Either kind of symbol a graphic can carry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Symbol {
    /// History point marker.
    Point(PointSymbol),
    /// Route stroke.
    Route(RouteSymbol),
}

/// Base marker color for an event, before any status-driven dimming.
pub fn base_color(event: &EventType) -> Rgb {
    match event {
        EventType::FarmRegistration => FOREST_GREEN,
        EventType::ProcessorDeparture => ORANGE,
        EventType::DistributorDeparture | EventType::WarehouseArrival => DARK_BLUE,
        EventType::FinalDestination => RED,
        EventType::Other(_) => GREY,
    }
}

/// Marker for a history point of a batch in `status`.
///
/// A delivered batch keeps its terminal stage at full intensity and halves
/// every earlier stage.
pub fn resolve_point_symbol(event: &EventType, status: &BatchStatus) -> PointSymbol {
    let base = base_color(event);
    let color = if *status == BatchStatus::Delivered && *event != EventType::FinalDestination {
        base.scaled(DELIVERED_DIM_FACTOR)
    } else {
        base
    };
    PointSymbol {
        color,
        size: POINT_SIZE,
        outline: Outline {
            color: WHITE,
            width: 1.0,
        },
    }
}

/// Stroke for a route in `status`.
pub fn resolve_route_symbol(status: &RouteStatus) -> RouteSymbol {
    let (color, width, style) = match status {
        RouteStatus::Planned => (YELLOW, 2.0, LineStyle::Dash),
        RouteStatus::InTransit => (BRIGHT_BLUE, 4.0, LineStyle::Solid),
        RouteStatus::Delivered => (DARK_GREEN, 2.0, LineStyle::Dot),
        RouteStatus::Delayed => (RED, 3.0, LineStyle::DashDot),
        RouteStatus::Cancelled | RouteStatus::Other(_) => (GREY, 2.0, LineStyle::Solid),
    };
    RouteSymbol { color, width, style }
}

/// One legend row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    /// Display text.
    pub label: String,
    /// Swatch drawn next to the label.
    pub symbol: Symbol,
}

/// Legend rows for every known event type and route status, in display order.
pub fn legend() -> Vec<LegendEntry> {
    let events = [
        EventType::FarmRegistration,
        EventType::ProcessorDeparture,
        EventType::DistributorDeparture,
        EventType::WarehouseArrival,
        EventType::FinalDestination,
    ];
    let routes = [
        (RouteStatus::Planned, "Route planned"),
        (RouteStatus::InTransit, "Route in transit"),
        (RouteStatus::Delivered, "Route delivered"),
        (RouteStatus::Delayed, "Route delayed"),
        (RouteStatus::Cancelled, "Route cancelled"),
    ];

    let mut out: Vec<LegendEntry> = events
        .iter()
        .map(|e| LegendEntry {
            label: e.label().to_string(),
            symbol: Symbol::Point(resolve_point_symbol(e, &BatchStatus::InTransit)),
        })
        .collect();
    out.extend(routes.iter().map(|(s, label)| LegendEntry {
        label: (*label).to_string(),
        symbol: Symbol::Route(resolve_route_symbol(s)),
    }));
    out
}
