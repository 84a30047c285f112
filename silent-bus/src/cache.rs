//! Caching layer for BusNearby station search.
//!
//! Station names and codes change rarely, while setup and the search
//! endpoint of the HTTP adapter can ask for the same query many times.
//! Stop times and route plans are never cached: they are the live data.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache as MokaCache;
use tracing::debug;

use crate::busnearby::{ApiError, BusNearbyClient, StationInfo};
use crate::domain::StopId;
use crate::setup::StationDirectory;

/// Cache key for search results: (query, locale).
type SearchKey = (String, String);

/// Cached search results.
type SearchEntry = Arc<Vec<StationInfo>>;

/// Configuration for the cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for cached entries.
    pub ttl: Duration,

    /// Maximum number of cached entries.
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            max_capacity: 1000,
        }
    }
}

/// BusNearby client with cached station search.
///
/// Only successful searches are cached, so a transient failure or an
/// empty result is retried on the next call.
#[derive(Clone)]
pub struct CachedBusNearbyClient {
    client: BusNearbyClient,
    searches: MokaCache<SearchKey, SearchEntry>,
}

impl CachedBusNearbyClient {
    /// Create a new cached client.
    pub fn new(client: BusNearbyClient, config: &CacheConfig) -> Self {
        let searches = MokaCache::builder()
            .time_to_live(config.ttl)
            .max_capacity(config.max_capacity)
            .build();

        Self { client, searches }
    }

    /// Search stations, using the cache if available.
    ///
    /// Queries are trimmed before lookup, so `" 24068"` and `"24068"` share
    /// an entry.
    pub async fn search(&self, query: &str, locale: &str) -> Result<SearchEntry, ApiError> {
        let key = (query.trim().to_string(), locale.to_string());

        if let Some(cached) = self.searches.get(&key).await {
            debug!(query = %key.0, locale, "Station search cache hit");
            return Ok(cached);
        }

        let stations = Arc::new(self.client.search(&key.0, locale).await?);
        self.searches.insert(key, Arc::clone(&stations)).await;

        Ok(stations)
    }

    /// Access the underlying client for operations that bypass cache.
    pub fn client(&self) -> &BusNearbyClient {
        &self.client
    }

    /// Get cache statistics.
    pub fn cache_entry_count(&self) -> u64 {
        self.searches.entry_count()
    }

    /// Invalidate all cached entries.
    pub fn invalidate_cache(&self) {
        self.searches.invalidate_all();
    }
}

impl StationDirectory for CachedBusNearbyClient {
    async fn search(&self, query: &str, locale: &str) -> Result<Vec<StationInfo>, ApiError> {
        CachedBusNearbyClient::search(self, query, locale)
            .await
            .map(|stations| stations.as_ref().clone())
    }

    async fn check_station(&self, stop_id: &StopId) -> Result<(), ApiError> {
        self.client.check_station(stop_id).await
    }
}
