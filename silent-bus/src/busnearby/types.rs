//! BusNearby API response DTOs.
//!
//! These types map directly to the JSON the BusNearby endpoints return.
//! Nearly everything is optional because the upstream omits fields freely;
//! deciding what a missing field means is left to `convert`.

use serde::{Deserialize, Deserializer, Serialize};

/// One hit from the station search endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StationInfo {
    /// Station code. The upstream sends either a string or a number.
    #[serde(deserialize_with = "string_or_number")]
    pub stop_id: String,

    #[serde(default)]
    pub name: String,

    pub city: Option<String>,

    pub lat: Option<f64>,

    pub lon: Option<f64>,
}

/// One entry of the `times` array from the stop-times endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawArrival {
    /// Public line number, e.g. "249". Sometimes sent as a number.
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub route_short_name: Option<String>,

    /// Midnight of the service day, as a unix timestamp (seconds).
    #[serde(default)]
    pub service_day: i64,

    /// Predicted arrival, seconds after `service_day`.
    pub realtime_arrival: Option<i64>,

    /// Timetabled arrival, seconds after `service_day`.
    pub scheduled_arrival: Option<i64>,

    /// Whether `realtime_arrival` comes from live vehicle data.
    #[serde(default)]
    pub realtime: bool,

    pub headsign: Option<String>,

    pub trip_headsign: Option<String>,
}

/// One itinerary from the route plan endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawItinerary {
    /// Departure, unix timestamp in milliseconds.
    pub start_time: Option<i64>,

    /// Total duration in seconds.
    #[serde(default)]
    pub duration: i64,

    #[serde(default)]
    pub legs: Vec<RawLeg>,

    #[serde(default)]
    pub realtime: bool,
}

/// A leg of an itinerary (walk, bus, rail...).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RawLeg {
    /// Travel mode, e.g. "RAIL" or "WALK".
    pub mode: Option<String>,

    pub to: Option<RawPlace>,
}

/// The end point of a leg.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RawPlace {
    pub name: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Code {
    Text(String),
    Number(serde_json::Number),
}

impl Code {
    fn into_string(self) -> String {
        match self {
            Code::Text(s) => s,
            Code::Number(n) => n.to_string(),
        }
    }
}

/// Accept a JSON/YAML string or number and keep it as text.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Code::deserialize(deserializer).map(Code::into_string)
}

/// Like [`string_or_number`], with `null` as `None`.
fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Code>::deserialize(deserializer)?.map(Code::into_string))
}
