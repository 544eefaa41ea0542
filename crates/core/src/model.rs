//! Domain model of the active-locations feed.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Declares a string-backed wire enum.
///
/// Matching is case-insensitive and tolerates surrounding whitespace. Values the
/// build does not know are kept in `Other` so new upstream kinds never fail a decode.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $canon:literal $(| $alias:literal)* ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// A value this build does not recognize, kept verbatim.
            Other(String),
        }

        impl $name {
            /// Parses a wire value.
            pub fn parse(s: &str) -> Self {
                match s.trim().to_ascii_uppercase().as_str() {
                    $( $canon $(| $alias)* => Self::$variant, )+
                    _ => Self::Other(s.trim().to_string()),
                }
            }

            /// Canonical wire name.
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $canon, )+
                    Self::Other(s) => s.as_str(),
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::parse(&s)
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> String {
                v.as_str().to_string()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// Supply-chain event recorded at a history point.
    EventType {
        /// Batch registered at the farm.
        FarmRegistration => "FARM_REGISTRATION" | "REGISTERED",
        /// Batch left the processor.
        ProcessorDeparture => "PROCESSOR_DEPARTURE" | "PROCESSED",
        /// Batch left the distributor.
        DistributorDeparture => "DISTRIBUTOR_DEPARTURE",
        /// Batch arrived at a warehouse.
        WarehouseArrival => "WAREHOUSE_ARRIVAL",
        /// Batch reached its final destination.
        FinalDestination => "FINAL_DESTINATION",
    }
}

wire_enum! {
    /// Lifecycle status of a whole batch.
    BatchStatus {
        /// Registered, not yet processed.
        Registered => "REGISTERED",
        /// Processing in progress.
        Processing => "PROCESSING",
        /// Processing finished.
        Processed => "PROCESSED",
        /// Moving between parties.
        InTransit => "IN_TRANSIT",
        /// Delivered to the final destination.
        Delivered => "DELIVERED",
    }
}

wire_enum! {
    /// Status of one transport route.
    RouteStatus {
        /// Route planned, shipment not yet left.
        Planned => "PLANNED",
        /// Shipment on the road.
        InTransit => "IN_TRANSIT",
        /// Shipment arrived.
        Delivered => "DELIVERED",
        /// Shipment late against plan.
        Delayed => "DELAYED",
        /// Route cancelled.
        Cancelled => "CANCELLED",
    }
}

impl EventType {
    /// Human-readable label used in popups and the legend.
    pub fn label(&self) -> &str {
        match self {
            Self::FarmRegistration => "Farm registration",
            Self::ProcessorDeparture => "Processor departure",
            Self::DistributorDeparture => "Distributor departure",
            Self::WarehouseArrival => "Warehouse arrival",
            Self::FinalDestination => "Final destination",
            Self::Other(s) => s.as_str(),
        }
    }
}

/// One recorded stop in a batch's history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    /// What happened at this stop.
    pub event_type: EventType,
    /// WGS84 latitude in degrees.
    pub latitude: f64,
    /// WGS84 longitude in degrees.
    pub longitude: f64,
    /// Event time as sent by the backend (ISO-8601 string or epoch number).
    #[serde(default, deserialize_with = "timestamp_from_wire")]
    pub timestamp: Option<String>,
    /// Free-form details (crop type, product name, location name, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl HistoryPoint {
    /// Returns the first non-empty metadata value among `keys`, rendered as text.
    pub fn metadata_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| match self.metadata.get(*k)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.trim().to_string()),
            other => Some(other.to_string()),
        })
    }
}

/// Origin/destination pair of an active shipment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSegment {
    /// Origin latitude.
    pub origin_lat: f64,
    /// Origin longitude.
    pub origin_lng: f64,
    /// Destination latitude.
    pub destination_lat: f64,
    /// Destination longitude.
    pub destination_lng: f64,
    /// Shipment status on this route.
    pub status: RouteStatus,
}

/// Weather observed at the batch's latest location.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    /// Degrees Celsius.
    pub temperature: Option<f64>,
    /// Relative humidity in percent.
    pub humidity: Option<f64>,
    /// Short condition, e.g. "Clouds".
    pub main: Option<String>,
    /// Longer description, e.g. "scattered clouds".
    pub description: Option<String>,
}

impl Weather {
    /// True when no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.humidity.is_none()
            && self.main.is_none()
            && self.description.is_none()
    }
}

/// Location state of one active batch as of a single feed fetch.
///
/// Snapshots are replaced wholesale on every poll and never patched.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchSnapshot {
    /// Batch identifier from the ledger.
    pub batch_id: String,
    /// Lifecycle status of the batch.
    pub status: BatchStatus,
    /// Chronological.
    pub history_points: Vec<HistoryPoint>,
    /// Shipments currently planned or under way.
    pub active_routes: Vec<RouteSegment>,
    /// Absent when the feed sent no weather fields.
    pub weather: Option<Weather>,
}

fn timestamp_from_wire<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
