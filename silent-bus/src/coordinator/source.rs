//! Where the coordinator gets its data and its idea of time.

use std::future::Future;

use chrono::{DateTime, Local, Timelike, Utc};

use crate::busnearby::{ApiError, BusNearbyClient, RawArrival, RawItinerary};
use crate::domain::{RouteTarget, StopTarget};

/// Trait for fetching raw arrival data.
///
/// This abstraction allows the coordinator to be tested with canned data
/// instead of a live HTTP client.
pub trait ArrivalSource: Send + Sync + 'static {
    /// Upcoming arrivals at a stop, already filtered to the target's lines.
    fn stop_times(
        &self,
        target: &StopTarget,
    ) -> impl Future<Output = Result<Vec<RawArrival>, ApiError>> + Send;

    /// Rail itineraries for an origin/destination pair.
    fn route_plans(
        &self,
        target: &RouteTarget,
    ) -> impl Future<Output = Result<Vec<RawItinerary>, ApiError>> + Send;
}

impl ArrivalSource for BusNearbyClient {
    async fn stop_times(&self, target: &StopTarget) -> Result<Vec<RawArrival>, ApiError> {
        self.fetch_times_default_window(&target.stop_id, &target.lines, target.max_arrivals)
            .await
    }

    async fn route_plans(&self, target: &RouteTarget) -> Result<Vec<RawItinerary>, ApiError> {
        self.fetch_routes(&target.origin, &target.destination, target.max_itineraries)
            .await
    }
}

/// Wall-clock access for the refresh cycle.
pub trait Clock: Send + Sync + 'static {
    /// The instant minutes-until values are computed against.
    fn now(&self) -> DateTime<Utc>;

    /// Local hour of day (0-23), used for the night window.
    fn local_hour(&self) -> u32;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_hour(&self) -> u32 {
        Local::now().hour()
    }
}
