//! Application state for the web layer.

use std::sync::Arc;

use crate::busnearby::BusNearbyClient;
use crate::cache::CachedBusNearbyClient;
use crate::registry::Registry;

/// The registry as wired up against the live API.
pub type LiveRegistry = Registry<BusNearbyClient, CachedBusNearbyClient>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Running entries
    pub registry: Arc<LiveRegistry>,

    /// Cached station search
    pub stations: Arc<CachedBusNearbyClient>,
}

impl AppState {
    /// Create a new app state.
    pub fn new(registry: Arc<LiveRegistry>, stations: CachedBusNearbyClient) -> Self {
        Self {
            registry,
            stations: Arc::new(stations),
        }
    }

    /// Locale used when a request does not name one.
    pub fn default_locale(&self) -> String {
        self.registry.store().current().locale
    }
}
