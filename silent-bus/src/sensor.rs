//! Sensors: the per-line and per-route views a host displays.
//!
//! A stop entry gets one sensor per configured line; a route entry gets a
//! single "next train" sensor. Rendering is a pure read of a snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{ArrivalRecord, MonitorTarget, ROUTE_KEY, Snapshot, Transport};

/// Credit shown with every reading.
pub const ATTRIBUTION: &str = "Data provided by BusNearby";

/// Prefix of every sensor id.
const SENSOR_DOMAIN: &str = "silent_bus";

const NO_DATA: &str = "No data";
const UNIT_MINUTES: &str = "min";

/// What a sensor reports on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorKind {
    Line {
        station_id: String,
        station_name: String,
        line: String,
    },
    Route {
        from_station: String,
        to_station: String,
        from_station_name: String,
        to_station_name: String,
    },
}

/// A sensor definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sensor {
    pub unique_id: String,
    pub name: String,
    /// Grouping name, e.g. `Bus Station Central`.
    pub device_name: String,
    pub icon: &'static str,
    pub kind: SensorKind,
}

/// A rendered sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub unique_id: String,
    pub name: String,
    pub device_name: String,
    pub icon: &'static str,
    /// Minutes until the next vehicle, or a status label.
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
    pub available: bool,
    pub attributes: SensorAttributes,
}

/// Extra data attached to a reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorAttributes {
    #[serde(flatten)]
    pub subject: Subject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_arrival: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_time: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub upcoming_arrivals: Vec<ArrivalRecord>,
    pub attribution: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

/// Identifying attributes of a reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Subject {
    Line {
        line_number: String,
        station_id: String,
        station_name: String,
    },
    Route {
        from_station: String,
        to_station: String,
        from_station_name: String,
        to_station_name: String,
    },
}

impl Sensor {
    /// The sensors a target exposes.
    pub fn for_target(target: &MonitorTarget, transport: Transport) -> Vec<Sensor> {
        match target {
            MonitorTarget::Stop(stop) => stop
                .lines
                .iter()
                .map(|line| Sensor {
                    unique_id: format!("{SENSOR_DOMAIN}_{}_{line}", stop.stop_id),
                    name: format!("Line {line}"),
                    device_name: format!("{} Station {}", transport.label(), stop.name),
                    icon: transport.icon(),
                    kind: SensorKind::Line {
                        station_id: stop.stop_id.to_string(),
                        station_name: stop.name.clone(),
                        line: line.to_string(),
                    },
                })
                .collect(),
            MonitorTarget::Route(route) => vec![Sensor {
                unique_id: format!(
                    "{SENSOR_DOMAIN}_train_{}_{}",
                    route.origin, route.destination
                ),
                name: "Next Train".to_string(),
                device_name: format!(
                    "Train Route {} → {}",
                    route.origin_name, route.destination_name
                ),
                icon: Transport::Train.icon(),
                kind: SensorKind::Route {
                    from_station: route.origin.to_string(),
                    to_station: route.destination.to_string(),
                    from_station_name: route.origin_name.clone(),
                    to_station_name: route.destination_name.clone(),
                },
            }],
        }
    }

    /// The snapshot key this sensor reads.
    pub fn key(&self) -> &str {
        match &self.kind {
            SensorKind::Line { line, .. } => line.as_str(),
            SensorKind::Route { .. } => ROUTE_KEY,
        }
    }

    /// Label shown when the vehicle is due now.
    fn due_label(&self) -> &'static str {
        match self.kind {
            SensorKind::Line { .. } => "Arrived",
            SensorKind::Route { .. } => "Departing",
        }
    }

    /// State and unit for the soonest record.
    pub fn state(&self, next: Option<&ArrivalRecord>) -> (String, Option<&'static str>) {
        match next {
            None => (NO_DATA.to_string(), None),
            Some(record) if record.minutes_until == 0 => (self.due_label().to_string(), None),
            Some(record) => (record.minutes_until.to_string(), Some(UNIT_MINUTES)),
        }
    }

    /// Render against a snapshot.
    pub fn render(
        &self,
        snapshot: &Snapshot,
        available: bool,
        last_update: Option<DateTime<Utc>>,
    ) -> SensorReading {
        let records = snapshot.get(self.key()).unwrap_or_default();
        let next = records.first();
        let (state, unit) = self.state(next);

        let subject = match &self.kind {
            SensorKind::Line {
                station_id,
                station_name,
                line,
            } => Subject::Line {
                line_number: line.clone(),
                station_id: station_id.clone(),
                station_name: station_name.clone(),
            },
            SensorKind::Route {
                from_station,
                to_station,
                from_station_name,
                to_station_name,
            } => Subject::Route {
                from_station: from_station.clone(),
                to_station: to_station.clone(),
                from_station_name: from_station_name.clone(),
                to_station_name: to_station_name.clone(),
            },
        };

        SensorReading {
            unique_id: self.unique_id.clone(),
            name: self.name.clone(),
            device_name: self.device_name.clone(),
            icon: self.icon,
            state,
            unit,
            available,
            attributes: SensorAttributes {
                subject,
                next_arrival: next.map(|r| r.arrival_time),
                real_time: next.map(|r| r.is_realtime),
                direction: next.map(|r| r.direction.clone()),
                duration_minutes: next.and_then(|r| r.duration_minutes),
                upcoming_arrivals: records.to_vec(),
                attribution: ATTRIBUTION,
                last_update,
            },
        }
    }
}
