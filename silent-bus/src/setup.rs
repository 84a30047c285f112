//! Turning a config entry into a validated monitor target.
//!
//! Stations are checked against the live API before a coordinator is built
//! for them, and missing display names are looked up through station search.

use std::future::Future;

use tracing::debug;

use crate::busnearby::{ApiError, StationInfo};
use crate::config::{EntryConfig, TargetConfig};
use crate::domain::{
    EmptyLineSet, InvalidStopId, LineSet, MonitorTarget, RouteTarget, StopId, StopTarget,
};

/// Trait for looking up stations.
///
/// Implemented by the cached BusNearby client; tests use canned stations.
pub trait StationDirectory: Send + Sync + 'static {
    /// Search stations by name or code.
    fn search(
        &self,
        query: &str,
        locale: &str,
    ) -> impl Future<Output = Result<Vec<StationInfo>, ApiError>> + Send;

    /// Check that a station answers stop-time queries.
    fn check_station(&self, stop_id: &StopId)
    -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// Why an entry could not be activated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    InvalidStopId(#[from] InvalidStopId),

    #[error("station {0} not found")]
    StationNotFound(String),

    #[error("cannot connect to BusNearby: {0}")]
    CannotConnect(ApiError),

    #[error("at least one line is required")]
    NoLines,
}

impl From<EmptyLineSet> for SetupError {
    fn from(_: EmptyLineSet) -> Self {
        SetupError::NoLines
    }
}

/// Parse comma-separated line input, rejecting input with no lines.
pub fn parse_lines(input: &str) -> Result<LineSet, SetupError> {
    Ok(LineSet::parse(input)?)
}

/// Check a station, keeping "not found" apart from "cannot connect".
pub async fn validate_station<D: StationDirectory>(
    directory: &D,
    stop_id: &StopId,
) -> Result<(), SetupError> {
    match directory.check_station(stop_id).await {
        Ok(()) => Ok(()),
        Err(ApiError::NotFound(_) | ApiError::InvalidResponse(_)) => {
            Err(SetupError::StationNotFound(stop_id.to_string()))
        }
        Err(e) => Err(SetupError::CannotConnect(e)),
    }
}

/// Display name for a station: the first search hit, else `Station <id>`.
///
/// Search failures only cost the nicer name.
pub async fn resolve_name<D: StationDirectory>(
    directory: &D,
    stop_id: &StopId,
    locale: &str,
) -> String {
    match directory.search(stop_id.as_str(), locale).await {
        Ok(stations) => stations
            .into_iter()
            .next()
            .map(|s| s.name)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| fallback_name(stop_id)),
        Err(e) => {
            debug!(stop = %stop_id, error = %e, "Station name lookup failed");
            fallback_name(stop_id)
        }
    }
}

fn fallback_name(stop_id: &StopId) -> String {
    format!("Station {stop_id}")
}

/// Validate an entry against the API and build its monitor target.
///
/// Configured display names are kept; missing ones are resolved.
pub async fn resolve_entry<D: StationDirectory>(
    directory: &D,
    entry: &EntryConfig,
    locale: &str,
) -> Result<MonitorTarget, SetupError> {
    match &entry.target {
        TargetConfig::Bus(stop) | TargetConfig::LightRail(stop) => {
            let stop_id = StopId::parse(&stop.station_id)?;
            let lines = parse_lines(&stop.lines)?;

            validate_station(directory, &stop_id).await?;

            let name = match &stop.station_name {
                Some(name) => name.clone(),
                None => resolve_name(directory, &stop_id, locale).await,
            };

            Ok(MonitorTarget::Stop(StopTarget {
                stop_id,
                name,
                lines,
                max_arrivals: entry.max_arrivals,
            }))
        }
        TargetConfig::Train(route) => {
            let origin = StopId::parse(&route.from_station)?;
            let destination = StopId::parse(&route.to_station)?;

            futures::try_join!(
                validate_station(directory, &origin),
                validate_station(directory, &destination),
            )?;

            let origin_name = match &route.from_station_name {
                Some(name) => name.clone(),
                None => resolve_name(directory, &origin, locale).await,
            };
            let destination_name = match &route.to_station_name {
                Some(name) => name.clone(),
                None => resolve_name(directory, &destination, locale).await,
            };

            Ok(MonitorTarget::Route(RouteTarget {
                origin,
                destination,
                origin_name,
                destination_name,
                max_itineraries: entry.max_arrivals,
            }))
        }
    }
}
