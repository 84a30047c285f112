//! BusNearby HTTP client.
//!
//! Provides async methods for the three read endpoints the monitor needs:
//! station search, stop times, and rail route plans. Transient failures are
//! retried with exponential backoff; everything else maps to [`ApiError`].

use std::time::Duration;

use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::domain::{LineSet, StopId};

use super::error::ApiError;
use super::retry::RetryPolicy;
use super::types::{RawArrival, RawItinerary, StationInfo};

/// Default base URL for the routing API.
const DEFAULT_BASE_URL: &str = "https://api.busnearby.co.il";

/// Default URL of the station search endpoint.
const DEFAULT_SEARCH_URL: &str = "https://app.busnearby.co.il/stopSearch";

/// The web app the API expects requests to come from.
const DEFAULT_REFERER: &str = "https://app.busnearby.co.il";

/// The API rejects obviously non-browser clients.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default look-ahead window for stop times (24 hours).
const DEFAULT_TIME_RANGE_SECS: u32 = 86_400;

/// Configuration for the BusNearby client.
#[derive(Debug, Clone)]
pub struct BusNearbyConfig {
    /// Base URL for the routing API
    pub base_url: String,
    /// Station search URL
    pub search_url: String,
    /// Referer header sent with every request
    pub referer: String,
    /// User-Agent header sent with every request
    pub user_agent: String,
    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,
    /// Retry policy for timeouts and connection failures
    pub retry: RetryPolicy,
    /// Look-ahead window for stop times, in seconds
    pub time_range_secs: u32,
}

impl BusNearbyConfig {
    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set a custom search URL (for testing).
    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for BusNearbyConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 10,
            retry: RetryPolicy::default(),
            time_range_secs: DEFAULT_TIME_RANGE_SECS,
        }
    }
}

/// BusNearby API client.
///
/// Cheap to clone: clones share the underlying connection pool. The client
/// never owns the pool's lifecycle, so a pool handed in with
/// [`BusNearbyClient::with_http`] can be shared with other users.
#[derive(Debug, Clone)]
pub struct BusNearbyClient {
    http: reqwest::Client,
    headers: HeaderMap,
    base_url: String,
    search_url: String,
    timeout: Duration,
    retry: RetryPolicy,
    time_range_secs: u32,
}

impl BusNearbyClient {
    /// Create a client with its own connection pool.
    pub fn new(config: BusNearbyConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::ConnectionFailure(format!("failed to build HTTP client: {e}")))?;
        Self::with_http(http, config)
    }

    /// Create a client on top of an existing connection pool.
    pub fn with_http(http: reqwest::Client, config: BusNearbyConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, header_value(&config.user_agent)?);
        headers.insert(REFERER, header_value(&config.referer)?);

        Ok(Self {
            http,
            headers,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            search_url: config.search_url,
            timeout: Duration::from_secs(config.timeout_secs),
            retry: config.retry,
            time_range_secs: config.time_range_secs,
        })
    }

    /// Search stations by name or code.
    ///
    /// Fails with `NotFound` when nothing matches.
    pub async fn search(&self, query: &str, locale: &str) -> Result<Vec<StationInfo>, ApiError> {
        debug!(query, locale, "Searching for station");

        let params = [("query", query.to_string()), ("locale", locale.to_string())];
        let body = self.get_json(&self.search_url, &params).await?;
        let stations = parse_search(body, query)?;

        debug!(count = stations.len(), "Found stations");
        Ok(stations)
    }

    /// Upcoming arrivals at a stop, optionally restricted to some lines.
    ///
    /// An empty `line_filters` means every line is returned.
    pub async fn fetch_times(
        &self,
        stop_id: &StopId,
        line_filters: &LineSet,
        count: u32,
        window_secs: u32,
    ) -> Result<Vec<RawArrival>, ApiError> {
        debug!(stop = %stop_id, lines = %line_filters, "Getting stop times");

        let url = format!(
            "{}/directions/index/stops/{}/stoptimes",
            self.base_url,
            stop_id.namespaced()
        );
        let params = [
            ("numberOfDepartures", count.to_string()),
            ("timeRange", window_secs.to_string()),
            ("currentTime", Utc::now().timestamp().to_string()),
        ];

        let body = self.get_json(&url, &params).await?;
        let mut arrivals = parse_stop_times(body)?;
        retain_lines(&mut arrivals, line_filters);

        debug!(stop = %stop_id, count = arrivals.len(), "Retrieved arrivals");
        Ok(arrivals)
    }

    /// Upcoming arrivals using the configured look-ahead window.
    pub async fn fetch_times_default_window(
        &self,
        stop_id: &StopId,
        line_filters: &LineSet,
        count: u32,
    ) -> Result<Vec<RawArrival>, ApiError> {
        self.fetch_times(stop_id, line_filters, count, self.time_range_secs)
            .await
    }

    /// Rail itineraries between two stations.
    pub async fn fetch_routes(
        &self,
        origin: &StopId,
        destination: &StopId,
        count: u32,
    ) -> Result<Vec<RawItinerary>, ApiError> {
        debug!(from = %origin, to = %destination, "Getting route plans");

        let url = format!("{}/directions/index/plan", self.base_url);
        let params = [
            ("fromPlace", origin.namespaced()),
            ("toPlace", destination.namespaced()),
            ("numItineraries", count.to_string()),
            ("mode", "TRAIN,WALK".to_string()),
            ("arriveBy", "false".to_string()),
        ];

        let body = self.get_json(&url, &params).await?;
        let itineraries = parse_plan(body)?;

        debug!(count = itineraries.len(), "Retrieved itineraries");
        Ok(itineraries)
    }

    /// Check that a station answers stop-time queries, keeping the error.
    pub async fn check_station(&self, stop_id: &StopId) -> Result<(), ApiError> {
        self.fetch_times_default_window(stop_id, &LineSet::new(), 1)
            .await
            .map(|_| ())
    }

    /// Whether a station answers stop-time queries.
    ///
    /// Every error is reported as `false`.
    pub async fn validate(&self, stop_id: &StopId) -> bool {
        match self.check_station(stop_id).await {
            Ok(()) => true,
            Err(e) => {
                debug!(stop = %stop_id, error = %e, "Station failed validation");
                false
            }
        }
    }

    /// GET with retries, returning the decoded JSON body.
    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value, ApiError> {
        self.retry.run(|| self.get_json_once(url, params)).await
    }

    async fn get_json_once(&self, url: &str, params: &[(&str, String)]) -> Result<Value, ApiError> {
        let response = self
            .http
            .get(url)
            .headers(self.headers.clone())
            .query(params)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ApiError::from_transport)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(format!("HTTP {status} from {url}")));
        }
        if !status.is_success() {
            return Err(ApiError::ConnectionFailure(format!("HTTP {status} from {url}")));
        }

        let body = response.text().await.map_err(ApiError::from_transport)?;

        serde_json::from_str(&body).map_err(|e| {
            ApiError::InvalidResponse(format!(
                "{e} (body: {})",
                body.chars().take(200).collect::<String>()
            ))
        })
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|_| ApiError::InvalidResponse(format!("invalid header value: {value}")))
}

/// Decode a JSON value into `T`, reporting failures as invalid responses.
fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, ApiError> {
    serde_json::from_value(value)
        .map_err(|e| ApiError::InvalidResponse(format!("failed to parse {what}: {e}")))
}

/// Validate the search payload: a non-empty JSON array of stations.
fn parse_search(body: Value, query: &str) -> Result<Vec<StationInfo>, ApiError> {
    let Value::Array(items) = body else {
        return Err(ApiError::InvalidResponse(
            "expected list response from search".to_string(),
        ));
    };

    if items.is_empty() {
        return Err(ApiError::NotFound(format!(
            "no stations found for query: {query}"
        )));
    }

    decode(Value::Array(items), "search results")
}

/// Extract the `times` array from a stop-times payload.
fn parse_stop_times(body: Value) -> Result<Vec<RawArrival>, ApiError> {
    let Value::Object(mut map) = body else {
        return Err(ApiError::InvalidResponse(
            "invalid response format: missing 'times' key".to_string(),
        ));
    };

    match map.remove("times") {
        Some(Value::Array(items)) => Ok(decode_each(items, "arrival").flatten().collect()),
        Some(_) => Err(ApiError::InvalidResponse(
            "invalid response format: 'times' is not a list".to_string(),
        )),
        None => Err(ApiError::InvalidResponse(
            "invalid response format: missing 'times' key".to_string(),
        )),
    }
}

/// Extract `plan.itineraries` from a route plan payload.
fn parse_plan(body: Value) -> Result<Vec<RawItinerary>, ApiError> {
    match body.pointer("/plan/itineraries") {
        Some(Value::Array(_)) => {}
        Some(_) => {
            return Err(ApiError::InvalidResponse(
                "invalid response format: 'itineraries' is not a list".to_string(),
            ));
        }
        None => {
            return Err(ApiError::InvalidResponse(
                "invalid response format: missing 'plan.itineraries'".to_string(),
            ));
        }
    }

    let mut body = body;
    let items = match body.pointer_mut("/plan/itineraries").map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };

    // A malformed itinerary keeps its slot so later ones keep their index.
    Ok(decode_each(items, "itinerary")
        .map(Option::unwrap_or_default)
        .collect())
}

/// Decode array elements one by one; a malformed element becomes `None`.
fn decode_each<T: DeserializeOwned>(
    items: Vec<Value>,
    what: &'static str,
) -> impl Iterator<Item = Option<T>> {
    items
        .into_iter()
        .enumerate()
        .map(move |(index, item)| match serde_json::from_value(item) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(index, what, error = %e, "Skipping malformed entry");
                None
            }
        })
}

/// Keep only arrivals whose line is in `lines`; an empty set keeps all.
fn retain_lines(arrivals: &mut Vec<RawArrival>, lines: &LineSet) {
    if lines.is_empty() {
        return;
    }
    arrivals.retain(|a| {
        a.route_short_name
            .as_deref()
            .is_some_and(|line| lines.contains(line))
    });
}
