//! Conversion from BusNearby DTOs to a [`Snapshot`].
//!
//! Pure functions: the caller supplies `now`, so the same input always
//! produces the same snapshot. Entries that lack the fields needed to place
//! them in time are skipped rather than failing the whole response.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::domain::{ArrivalRecord, ROUTE_KEY, Snapshot, minutes_until};

use super::types::{RawArrival, RawItinerary};

/// Direction shown when the upstream gives no headsign.
const UNKNOWN_DIRECTION: &str = "Unknown";

/// Leg mode that counts toward a route's direction label.
const RAIL_MODE: &str = "RAIL";

/// Convert stop-times entries into per-line groups.
pub fn convert_stop_times(arrivals: &[RawArrival], now: DateTime<Utc>) -> Snapshot {
    Snapshot::from_records(arrivals.iter().filter_map(|a| convert_arrival(a, now)))
}

/// Convert a single stop-times entry.
///
/// Returns `None` for entries without a line number or with an arrival
/// time outside chrono's range.
pub fn convert_arrival(arrival: &RawArrival, now: DateTime<Utc>) -> Option<ArrivalRecord> {
    let line = match arrival.route_short_name.as_deref() {
        Some(line) if !line.is_empty() => line,
        _ => {
            trace!("Skipping arrival without routeShortName");
            return None;
        }
    };

    // Live prediction wins over the timetable
    let offset = arrival
        .realtime_arrival
        .or(arrival.scheduled_arrival)
        .unwrap_or(0);
    let arrival_time = DateTime::from_timestamp(arrival.service_day.checked_add(offset)?, 0)?;

    let direction = arrival
        .headsign
        .as_deref()
        .or(arrival.trip_headsign.as_deref())
        .unwrap_or(UNKNOWN_DIRECTION)
        .to_string();

    Some(ArrivalRecord {
        key: line.to_string(),
        arrival_time,
        minutes_until: minutes_until(arrival_time, now),
        is_realtime: arrival.realtime,
        direction,
        duration_minutes: None,
        route_index: None,
    })
}

/// Convert route plan itineraries into the single [`ROUTE_KEY`] group.
///
/// `destination_name` labels itineraries that have no rail legs.
pub fn convert_itineraries(
    itineraries: &[RawItinerary],
    now: DateTime<Utc>,
    destination_name: &str,
) -> Snapshot {
    Snapshot::from_records(
        itineraries
            .iter()
            .enumerate()
            .filter_map(|(idx, it)| convert_itinerary(idx, it, now, destination_name)),
    )
}

/// Convert one itinerary. Returns `None` when it has no usable `startTime`.
pub fn convert_itinerary(
    index: usize,
    itinerary: &RawItinerary,
    now: DateTime<Utc>,
    destination_name: &str,
) -> Option<ArrivalRecord> {
    let start_ms = match itinerary.start_time {
        Some(ms) if ms != 0 => ms,
        _ => {
            trace!(index, "Skipping itinerary without startTime");
            return None;
        }
    };
    let departure = DateTime::from_timestamp_millis(start_ms)?;

    let duration_minutes = u32::try_from(itinerary.duration.max(0) / 60).unwrap_or(u32::MAX);

    Some(ArrivalRecord {
        key: ROUTE_KEY.to_string(),
        arrival_time: departure,
        minutes_until: minutes_until(departure, now),
        is_realtime: itinerary.realtime,
        direction: rail_direction(itinerary).unwrap_or_else(|| destination_name.to_string()),
        duration_minutes: Some(duration_minutes),
        route_index: Some(index),
    })
}

/// Arrow-joined destinations of the rail legs, `None` if there are none.
fn rail_direction(itinerary: &RawItinerary) -> Option<String> {
    let stops: Vec<&str> = itinerary
        .legs
        .iter()
        .filter(|leg| leg.mode.as_deref() == Some(RAIL_MODE))
        .map(|leg| {
            leg.to
                .as_ref()
                .and_then(|place| place.name.as_deref())
                .unwrap_or(UNKNOWN_DIRECTION)
        })
        .collect();

    if stops.is_empty() {
        None
    } else {
        Some(stops.join(" → "))
    }
}
