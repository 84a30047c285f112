//! Transport modes served by BusNearby.

use serde::{Deserialize, Serialize};

/// The kind of vehicle a monitor entry tracks.
///
/// Buses and light rail are monitored per stop and line; trains are
/// monitored per origin/destination route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Bus,
    LightRail,
    Train,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Bus => "bus",
            Transport::LightRail => "light_rail",
            Transport::Train => "train",
        }
    }

    /// Human-readable label, e.g. for device names.
    pub fn label(&self) -> &'static str {
        match self {
            Transport::Bus => "Bus",
            Transport::LightRail => "Light Rail",
            Transport::Train => "Train",
        }
    }

    /// Material Design icon shown next to sensors.
    pub fn icon(&self) -> &'static str {
        match self {
            Transport::Bus => "mdi:bus",
            Transport::LightRail => "mdi:tram",
            Transport::Train => "mdi:train",
        }
    }

    /// Whether entries of this kind monitor a route rather than a stop.
    pub fn is_route(&self) -> bool {
        matches!(self, Transport::Train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_names() {
        let t: Transport = serde_json::from_str(r#""light_rail""#).unwrap();
        assert_eq!(t, Transport::LightRail);
        assert_eq!(serde_json::to_string(&Transport::Train).unwrap(), r#""train""#);
        assert_eq!(Transport::LightRail.as_str(), "light_rail");
    }

    #[test]
    fn only_trains_are_routes() {
        assert!(Transport::Train.is_route());
        assert!(!Transport::Bus.is_route());
        assert!(!Transport::LightRail.is_route());
    }
}
