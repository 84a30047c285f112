//! Data transfer objects for web requests and responses.

use serde::{Deserialize, Serialize};

use crate::busnearby::StationInfo;
use crate::coordinator::CycleOutcome;
use crate::registry::EntryStatus;
use crate::sensor::SensorReading;

/// Request to search stations.
#[derive(Debug, Deserialize)]
pub struct StationSearchRequest {
    /// Station name or code
    pub q: String,

    /// Search locale (defaults to the configured one)
    pub locale: Option<String>,
}

/// Station search results.
#[derive(Debug, Serialize)]
pub struct StationSearchResponse {
    pub stations: Vec<StationInfo>,
}

/// All running entries.
#[derive(Debug, Serialize)]
pub struct EntryListResponse {
    pub entries: Vec<EntryStatus>,
}

/// Rendered sensors of one entry.
#[derive(Debug, Serialize)]
pub struct SensorListResponse {
    pub entry: String,
    pub sensors: Vec<SensorReading>,
}

/// New line filters for a stop entry.
#[derive(Debug, Deserialize)]
pub struct UpdateLinesRequest {
    /// Comma-separated line numbers, e.g. "249, 40"
    pub lines: String,
}

/// Result of a manual refresh.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// One of `published`, `failed`, `coalesced`, `stopped`
    pub outcome: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<CycleOutcome> for RefreshResponse {
    fn from(outcome: CycleOutcome) -> Self {
        match outcome {
            CycleOutcome::Published => Self {
                outcome: "published",
                error: None,
            },
            CycleOutcome::Failed(e) => Self {
                outcome: "failed",
                error: Some(e.to_string()),
            },
            CycleOutcome::Coalesced => Self {
                outcome: "coalesced",
                error: None,
            },
            CycleOutcome::Stopped => Self {
                outcome: "stopped",
                error: None,
            },
        }
    }
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
