//! BusNearby transit API client.
//!
//! This module provides an HTTP client for the BusNearby routing API, which
//! serves station search, live stop times and rail route plans for Israeli
//! public transport.
//!
//! Key characteristics of BusNearby:
//! - Station codes are namespaced with an agency prefix (`1:`) on the wire
//! - Stop times are offsets in seconds from the service day's midnight
//! - Itinerary start times are unix timestamps in **milliseconds**
//! - Requests without a browser-like User-Agent and Referer are rejected

mod client;
mod convert;
mod error;
mod retry;
mod types;

pub use client::{BusNearbyClient, BusNearbyConfig};
pub use convert::{convert_itineraries, convert_stop_times};
pub use error::ApiError;
pub use retry::RetryPolicy;
pub use types::{RawArrival, RawItinerary, RawLeg, RawPlace, StationInfo};

pub(crate) use types::string_or_number;
