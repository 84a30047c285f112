//! Normalized arrivals and the snapshot readers see.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot key used for the single group of a route target.
pub const ROUTE_KEY: &str = "train_route";

/// One upcoming arrival (or departure, for routes) after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrivalRecord {
    /// Line number, or [`ROUTE_KEY`] for itineraries.
    pub key: String,
    pub arrival_time: DateTime<Utc>,
    /// Whole minutes until `arrival_time`, never negative.
    pub minutes_until: u32,
    pub is_realtime: bool,
    pub direction: String,
    /// Itinerary length in whole minutes (routes only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    /// Position in the upstream response (routes only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_index: Option<usize>,
}

/// Whole minutes from `now` until `instant`, truncated and clamped at zero.
pub fn minutes_until(instant: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let minutes = (instant - now).num_seconds() / 60;
    u32::try_from(minutes.max(0)).unwrap_or(u32::MAX)
}

/// All arrival data from one successful cycle, grouped by key.
///
/// A snapshot is built once and never mutated; each group is sorted by
/// `minutes_until` with ties kept in fetch order. Keys without records are
/// absent rather than mapped to an empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    groups: BTreeMap<String, Vec<ArrivalRecord>>,
}

impl Snapshot {
    /// The snapshot before any successful fetch.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Group records by key and sort each group.
    pub fn from_records(records: impl IntoIterator<Item = ArrivalRecord>) -> Self {
        let mut groups: BTreeMap<String, Vec<ArrivalRecord>> = BTreeMap::new();
        for record in records {
            groups.entry(record.key.clone()).or_default().push(record);
        }

        for group in groups.values_mut() {
            // sort_by_key is stable
            group.sort_by_key(|r| r.minutes_until);
        }

        Self { groups }
    }

    /// Records for a key, soonest first.
    pub fn get(&self, key: &str) -> Option<&[ArrivalRecord]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    /// The soonest record for a key.
    pub fn next(&self, key: &str) -> Option<&ArrivalRecord> {
        self.get(key).and_then(<[ArrivalRecord]>::first)
    }

    /// Minimum `minutes_until` across every group, `None` if there are no records.
    pub fn soonest_minutes(&self) -> Option<u32> {
        self.groups
            .values()
            .filter_map(|g| g.first())
            .map(|r| r.minutes_until)
            .min()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of records across all groups.
    pub fn record_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}
