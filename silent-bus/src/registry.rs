//! Running monitors: one coordinator and its sensors per config entry.
//!
//! The registry is the host side of the coordinator contract. It validates
//! entries, does the first refresh before a coordinator starts polling,
//! swaps coordinators on reload and routes service calls to them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::busnearby::RetryPolicy;
use crate::config::{ConfigError, ConfigStore, EntryConfig};
use crate::coordinator::{ArrivalSource, Coordinator, CoordinatorError, CycleOutcome, CycleState};
use crate::domain::{MonitorTarget, Transport};
use crate::sensor::{Sensor, SensorReading};
use crate::setup::{self, SetupError, StationDirectory};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown entry '{0}'")]
    UnknownEntry(String),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    /// The first refresh failed, so the entry was not activated
    #[error("entry '{id}' is not ready: {source}")]
    NotReady {
        id: String,
        source: CoordinatorError,
    },

    #[error("registry is shutting down")]
    ShuttingDown,
}

impl RegistryError {
    /// Whether setting the entry up again later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RegistryError::NotReady { .. } | RegistryError::Setup(SetupError::CannotConnect(_))
        )
    }
}

/// Longest wait between two setup attempts.
const MAX_SETUP_RETRY_DELAY: Duration = Duration::from_secs(10 * 60);

/// Summary of a running entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntryStatus {
    pub id: String,
    pub transport: Transport,
    pub title: String,
    pub available: bool,
    pub refreshing: bool,
    pub period_secs: u64,
    pub sensors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

struct ActiveEntry<S> {
    transport: Transport,
    coordinator: Arc<Coordinator<S>>,
    sensors: Vec<Sensor>,
    task: JoinHandle<()>,
}

/// All active entries.
pub struct Registry<S, D> {
    source: Arc<S>,
    directory: Arc<D>,
    store: Arc<ConfigStore>,
    entries: RwLock<HashMap<String, ActiveEntry<S>>>,
    shutdown: CancellationToken,
}

impl<S: ArrivalSource, D: StationDirectory> Registry<S, D> {
    pub fn new(source: Arc<S>, directory: Arc<D>, store: Arc<ConfigStore>) -> Self {
        Self {
            source,
            directory,
            store,
            entries: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Set up every configured entry concurrently.
    ///
    /// Returns the entries that failed; the others are running.
    pub async fn setup_all(&self) -> Vec<(String, RegistryError)> {
        let config = self.store.current();

        let results = join_all(config.entries.iter().map(|entry| async move {
            (entry.id.clone(), self.setup_entry(entry).await)
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(id, result)| result.err().map(|e| (id, e)))
            .collect()
    }

    /// Validate an entry, run its first refresh and start polling.
    ///
    /// An entry already running under the same id is replaced.
    pub async fn setup_entry(&self, entry: &EntryConfig) -> Result<(), RegistryError> {
        let target = self.resolve(entry).await?;
        let coordinator = Arc::new(Coordinator::new(
            entry.id.clone(),
            Arc::clone(&self.source),
            target,
            entry.update_period(),
        ));

        self.activate(entry, coordinator).await
    }

    /// Set up an entry, retrying transient failures with backoff.
    ///
    /// Delays follow `policy`, capped at ten minutes. Gives up after the
    /// policy's retries, on a permanent error, or when the registry shuts
    /// down.
    pub async fn setup_entry_with_retry(
        &self,
        entry: &EntryConfig,
        policy: RetryPolicy,
    ) -> Result<(), RegistryError> {
        let mut attempt = 0;
        loop {
            if self.shutdown.is_cancelled() {
                return Err(RegistryError::ShuttingDown);
            }

            match self.setup_entry(entry).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < policy.max_retries => {
                    let delay = policy.delay_for(attempt).min(MAX_SETUP_RETRY_DELAY);
                    warn!(
                        entry = %entry.id,
                        error = %e,
                        attempt = attempt + 1,
                        delay_secs = delay.as_secs_f64(),
                        "Entry not ready, retrying setup"
                    );

                    tokio::select! {
                        _ = self.shutdown.cancelled() => return Err(RegistryError::ShuttingDown),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Retry an entry's setup in the background.
    pub fn spawn_setup_retry(self: &Arc<Self>, entry: EntryConfig, policy: RetryPolicy) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = registry.setup_entry_with_retry(&entry, policy).await {
                error!(entry = %entry.id, error = %e, "Giving up on entry");
            }
        })
    }

    /// Stop an entry's coordinator and forget it.
    pub fn unload_entry(&self, id: &str) -> Result<(), RegistryError> {
        let active = self
            .entries
            .write()
            .remove(id)
            .ok_or_else(|| RegistryError::UnknownEntry(id.to_string()))?;

        active.coordinator.stop();
        info!(entry = id, "Unloaded entry");
        Ok(())
    }

    /// Re-read an entry from the config store and replace its coordinator.
    ///
    /// The replacement gets a freshly resolved target; nothing from the old
    /// one is mutated in place. The old coordinator keeps polling until the
    /// replacement's first refresh succeeds, and keeps its place if it fails.
    pub async fn reload_entry(&self, id: &str) -> Result<(), RegistryError> {
        let entry = self
            .store
            .entry(id)
            .ok_or_else(|| RegistryError::UnknownEntry(id.to_string()))?;

        let current = self.coordinator(id);
        let Some(current) = current else {
            return self.setup_entry(&entry).await;
        };

        let target = self.resolve(&entry).await?;
        let replacement = Arc::new(current.successor(target, entry.update_period()));

        info!(entry = id, "Reloading entry");
        self.activate(&entry, replacement).await
    }

    /// Refresh an entry now and report what happened.
    pub async fn refresh(&self, id: &str) -> Result<CycleOutcome, RegistryError> {
        let coordinator = self
            .coordinator(id)
            .ok_or_else(|| RegistryError::UnknownEntry(id.to_string()))?;

        Ok(coordinator.refresh().await)
    }

    /// Replace the line filters of a stop entry.
    ///
    /// The new lines are persisted first and only then applied to the live
    /// coordinator, so a failed write changes nothing. Sensors are rebuilt
    /// for the new lines and a refresh is requested.
    pub fn update_lines(&self, id: &str, input: &str) -> Result<Vec<SensorReading>, RegistryError> {
        let lines = setup::parse_lines(input)?;

        let coordinator = self
            .coordinator(id)
            .ok_or_else(|| RegistryError::UnknownEntry(id.to_string()))?;
        if let MonitorTarget::Route(_) = coordinator.target() {
            return Err(CoordinatorError::NotAStopTarget.into());
        }

        self.store.update_lines(id, &lines)?;
        coordinator.set_line_filters(lines)?;

        {
            let mut entries = self.entries.write();
            if let Some(active) = entries.get_mut(id) {
                active.sensors = Sensor::for_target(&coordinator.target(), active.transport);
            }
        }

        coordinator.request_refresh();
        self.readings(id)
    }

    /// Render every sensor of an entry.
    pub fn readings(&self, id: &str) -> Result<Vec<SensorReading>, RegistryError> {
        let entries = self.entries.read();
        let active = entries
            .get(id)
            .ok_or_else(|| RegistryError::UnknownEntry(id.to_string()))?;

        let snapshot = active.coordinator.snapshot();
        let available = active.coordinator.last_update_success();
        let last_update = active.coordinator.last_success_at();

        Ok(active
            .sensors
            .iter()
            .map(|sensor| sensor.render(&snapshot, available, last_update))
            .collect())
    }

    /// Status of every running entry, sorted by id.
    pub fn entries(&self) -> Vec<EntryStatus> {
        let entries = self.entries.read();
        let mut statuses: Vec<EntryStatus> = entries
            .iter()
            .map(|(id, active)| status_of(id, active))
            .collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    /// Status of one running entry.
    pub fn status(&self, id: &str) -> Option<EntryStatus> {
        self.entries.read().get(id).map(|active| status_of(id, active))
    }

    pub fn coordinator(&self, id: &str) -> Option<Arc<Coordinator<S>>> {
        self.entries
            .read()
            .get(id)
            .map(|active| Arc::clone(&active.coordinator))
    }

    /// Stop every coordinator and wait for the run loops to exit.
    ///
    /// Pending setup retries are abandoned.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let drained: Vec<ActiveEntry<S>> = self.entries.write().drain().map(|(_, a)| a).collect();

        for active in &drained {
            active.coordinator.stop();
        }

        for result in join_all(drained.into_iter().map(|a| a.task)).await {
            if let Err(e) = result {
                error!(error = %e, "Coordinator task failed");
            }
        }

        info!("All coordinators stopped");
    }

    async fn resolve(&self, entry: &EntryConfig) -> Result<MonitorTarget, RegistryError> {
        let locale = self.store.current().locale;
        match setup::resolve_entry(&*self.directory, entry, &locale).await {
            Ok(target) => Ok(target),
            Err(e) => {
                warn!(entry = %entry.id, error = %e, "Entry failed validation");
                Err(e.into())
            }
        }
    }

    /// First refresh, then start polling and register.
    async fn activate(
        &self,
        entry: &EntryConfig,
        coordinator: Arc<Coordinator<S>>,
    ) -> Result<(), RegistryError> {
        if let CycleOutcome::Failed(source) = coordinator.refresh().await {
            coordinator.stop();
            return Err(RegistryError::NotReady {
                id: entry.id.clone(),
                source,
            });
        }
        if self.shutdown.is_cancelled() {
            coordinator.stop();
            return Err(RegistryError::ShuttingDown);
        }

        let sensors = Sensor::for_target(&coordinator.target(), entry.transport());
        let task = coordinator.start();
        let sensor_count = sensors.len();

        let previous = self.entries.write().insert(
            entry.id.clone(),
            ActiveEntry {
                transport: entry.transport(),
                coordinator,
                sensors,
                task,
            },
        );
        if let Some(previous) = previous {
            previous.coordinator.stop();
        }

        info!(entry = %entry.id, sensors = sensor_count, "Entry set up");
        Ok(())
    }
}

fn status_of<S: ArrivalSource>(id: &str, active: &ActiveEntry<S>) -> EntryStatus {
    let coordinator = &active.coordinator;
    EntryStatus {
        id: id.to_string(),
        transport: active.transport,
        title: coordinator.target().title(),
        available: coordinator.last_update_success(),
        refreshing: coordinator.state() == CycleState::Refreshing,
        period_secs: coordinator.period().as_secs(),
        sensors: active.sensors.len(),
        last_update: coordinator.last_success_at(),
        last_error: coordinator.last_failure().map(|f| f.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::busnearby::{ApiError, RawArrival, RawItinerary, StationInfo};
    use crate::config::Config;
    use crate::domain::{RouteTarget, StopId, StopTarget};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Every stop has one arrival per line, five minutes out.
    #[derive(Default)]
    struct MockSource {
        failing: AtomicBool,
        /// Fail this many calls before answering.
        fail_next: AtomicU32,
        calls: AtomicU32,
    }

    impl ArrivalSource for MockSource {
        async fn stop_times(&self, target: &StopTarget) -> Result<Vec<RawArrival>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail_once = self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail_once || self.failing.load(Ordering::SeqCst) {
                return Err(ApiError::ConnectionFailure("refused".into()));
            }
            let service_day = Utc::now().timestamp();
            Ok(target
                .lines
                .iter()
                .map(|line| RawArrival {
                    route_short_name: Some(line.to_string()),
                    service_day,
                    realtime_arrival: Some(330),
                    ..RawArrival::default()
                })
                .collect())
        }

        async fn route_plans(&self, _target: &RouteTarget) -> Result<Vec<RawItinerary>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    /// Knows stations 24068, 3600 and 2300.
    struct MockDirectory;

    impl StationDirectory for MockDirectory {
        async fn search(&self, query: &str, _locale: &str) -> Result<Vec<StationInfo>, ApiError> {
            Ok(vec![StationInfo {
                stop_id: query.to_string(),
                name: format!("Stop {query}"),
                city: None,
                lat: None,
                lon: None,
            }])
        }

        async fn check_station(&self, stop_id: &StopId) -> Result<(), ApiError> {
            match stop_id.as_str() {
                "24068" | "3600" | "2300" => Ok(()),
                other => Err(ApiError::NotFound(other.to_string())),
            }
        }
    }

    fn registry(entries: Vec<EntryConfig>) -> (Registry<MockSource, MockDirectory>, Arc<MockSource>) {
        let source = Arc::new(MockSource::default());
        let store = ConfigStore::in_memory(Config {
            entries,
            ..Config::default()
        });
        let registry = Registry::new(Arc::clone(&source), Arc::new(MockDirectory), Arc::new(store));
        (registry, source)
    }

    #[tokio::test]
    async fn setup_all_reports_failures() {
        let (registry, _) = registry(vec![
            EntryConfig::bus("home", "24068", "249, 40"),
            EntryConfig::bus("bad", "11111", "1"),
            EntryConfig::route("commute", "3600", "2300"),
        ]);

        let failures = registry.setup_all().await;

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "bad");
        assert!(matches!(
            failures[0].1,
            RegistryError::Setup(SetupError::StationNotFound(_))
        ));

        let ids: Vec<_> = registry.entries().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["commute", "home"]);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn first_refresh_happens_during_setup() {
        let (registry, source) = registry(vec![EntryConfig::bus("home", "24068", "249, 40")]);

        registry.setup_all().await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        let readings = registry.readings("home").unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].state, "5");
        assert_eq!(readings[0].attributes.subject, crate::sensor::Subject::Line {
            line_number: "249".into(),
            station_id: "24068".into(),
            station_name: "Stop 24068".into(),
        });
        assert!(readings.iter().all(|r| r.available));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn failed_first_refresh_is_not_ready() {
        let (registry, source) = registry(vec![EntryConfig::bus("home", "24068", "249")]);
        source.failing.store(true, Ordering::SeqCst);

        let failures = registry.setup_all().await;

        assert!(matches!(failures[0].1, RegistryError::NotReady { .. }));
        assert!(registry.entries().is_empty());
    }

    #[tokio::test]
    async fn refresh_failure_marks_sensors_unavailable() {
        let (registry, source) = registry(vec![EntryConfig::bus("home", "24068", "249")]);
        registry.setup_all().await;

        source.failing.store(true, Ordering::SeqCst);
        let outcome = registry.refresh("home").await.unwrap();

        assert!(matches!(outcome, CycleOutcome::Failed(_)));
        let readings = registry.readings("home").unwrap();
        assert_eq!(readings[0].state, "5");
        assert!(!readings[0].available);

        let status = &registry.entries()[0];
        assert!(!status.available);
        assert!(status.last_error.as_deref().unwrap().contains("refused"));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn update_lines_persists_then_applies() {
        let (registry, _) = registry(vec![EntryConfig::bus("home", "24068", "249")]);
        registry.setup_all().await;

        let readings = registry.update_lines("home", "40, 605, 40").unwrap();

        let names: Vec<_> = readings.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Line 40", "Line 605"]);
        let stored = registry.store().entry("home").unwrap();
        assert_eq!(stored.target.as_stop().unwrap().lines, "40, 605");
        match registry.coordinator("home").unwrap().target() {
            MonitorTarget::Stop(stop) => assert_eq!(stop.lines.to_vec(), vec!["40", "605"]),
            other => panic!("expected stop target, got {other:?}"),
        }
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn update_lines_rejects_bad_input_without_changes() {
        let (registry, _) = registry(vec![
            EntryConfig::bus("home", "24068", "249"),
            EntryConfig::route("commute", "3600", "2300"),
        ]);
        registry.setup_all().await;

        assert!(matches!(
            registry.update_lines("home", " , "),
            Err(RegistryError::Setup(SetupError::NoLines))
        ));
        assert!(matches!(
            registry.update_lines("commute", "1"),
            Err(RegistryError::Coordinator(CoordinatorError::NotAStopTarget))
        ));
        assert!(matches!(
            registry.update_lines("nope", "1"),
            Err(RegistryError::UnknownEntry(_))
        ));
        assert_eq!(
            registry.store().entry("home").unwrap().target.as_stop().unwrap().lines,
            "249"
        );
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn reload_replaces_coordinator() {
        let (registry, _) = registry(vec![EntryConfig::bus("home", "24068", "249")]);
        registry.setup_all().await;
        let before = registry.coordinator("home").unwrap();

        registry.reload_entry("home").await.unwrap();

        let after = registry.coordinator("home").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(before.state(), CycleState::Stopped);
        assert!(after.last_update_success());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn unload_stops_coordinator() {
        let (registry, _) = registry(vec![EntryConfig::bus("home", "24068", "249")]);
        registry.setup_all().await;
        let coordinator = registry.coordinator("home").unwrap();

        registry.unload_entry("home").unwrap();

        assert_eq!(coordinator.state(), CycleState::Stopped);
        assert!(registry.coordinator("home").is_none());
        assert!(matches!(
            registry.unload_entry("home"),
            Err(RegistryError::UnknownEntry(_))
        ));
    }

    #[tokio::test]
    async fn failed_reload_keeps_current_coordinator() {
        let (registry, source) = registry(vec![EntryConfig::bus("home", "24068", "249")]);
        registry.setup_all().await;
        let before = registry.coordinator("home").unwrap();

        source.failing.store(true, Ordering::SeqCst);
        let err = registry.reload_entry("home").await.unwrap_err();

        assert!(matches!(err, RegistryError::NotReady { .. }));
        let current = registry.coordinator("home").unwrap();
        assert!(Arc::ptr_eq(&before, &current));
        assert_eq!(current.state(), CycleState::Idle);

        assert!(matches!(
            registry.refresh("home").await.unwrap(),
            CycleOutcome::Failed(_)
        ));
        assert!(!registry.status("home").unwrap().available);

        source.failing.store(false, Ordering::SeqCst);
        assert_eq!(registry.refresh("home").await.unwrap(), CycleOutcome::Published);
        assert!(registry.status("home").unwrap().available);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn setup_retries_until_ready() {
        let (registry, source) = registry(vec![]);
        source.fail_next.store(2, Ordering::SeqCst);
        let entry = EntryConfig::bus("home", "24068", "249");

        registry
            .setup_entry_with_retry(&entry, RetryPolicy::new(Duration::ZERO, 5))
            .await
            .unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(registry.status("home").unwrap().available);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn setup_retry_gives_up() {
        let (registry, source) = registry(vec![]);
        source.failing.store(true, Ordering::SeqCst);

        let err = registry
            .setup_entry_with_retry(
                &EntryConfig::bus("home", "24068", "249"),
                RetryPolicy::new(Duration::ZERO, 2),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::NotReady { .. }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(registry.coordinator("home").is_none());
    }

    #[tokio::test]
    async fn permanent_setup_error_is_not_retried() {
        let (registry, source) = registry(vec![]);

        let err = registry
            .setup_entry_with_retry(
                &EntryConfig::bus("bad", "11111", "1"),
                RetryPolicy::new(Duration::ZERO, 5),
            )
            .await
            .unwrap_err();

        assert!(!err.is_transient());
        assert!(matches!(err, RegistryError::Setup(SetupError::StationNotFound(_))));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn setup_retry_stops_at_shutdown() {
        let (registry, source) = registry(vec![]);
        source.failing.store(true, Ordering::SeqCst);
        let registry = Arc::new(registry);

        let handle = registry.spawn_setup_retry(
            EntryConfig::bus("home", "24068", "249"),
            RetryPolicy::new(Duration::from_secs(3600), 5),
        );
        while source.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        registry.shutdown().await;

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("retry task did not stop")
            .unwrap();
        assert!(registry.coordinator("home").is_none());
    }
}
