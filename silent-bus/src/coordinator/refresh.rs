//! The refresh state machine.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::busnearby::{ApiError, convert_itineraries, convert_stop_times};
use crate::domain::{ArrivalRecord, LineSet, MonitorTarget, Snapshot};
use crate::schedule::{AdaptiveScheduler, ScheduleConfig};

use super::error::CoordinatorError;
use super::source::{ArrivalSource, Clock, SystemClock};

/// Where a coordinator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Refreshing,
    /// Terminal. No further cycles start.
    Stopped,
}

/// What a call to [`Coordinator::refresh`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new snapshot was published.
    Published,
    /// The fetch failed; the previous snapshot is still served.
    Failed(CoordinatorError),
    /// Another cycle was already running, so this request did nothing.
    Coalesced,
    /// The coordinator is stopped; any fetched data was discarded.
    Stopped,
}

/// The most recent failed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub message: String,
    pub at: DateTime<Utc>,
    /// Failed cycles in a row, including this one.
    pub consecutive: u32,
}

#[derive(Debug, Default)]
struct CycleStatus {
    available: bool,
    last_success_at: Option<DateTime<Utc>>,
    last_failure: Option<FailureRecord>,
    consecutive_failures: u32,
}

/// Polls one monitor target and serves its latest snapshot.
///
/// Readers never block on I/O: every read goes to the last published
/// snapshot, which is swapped wholesale at the end of a successful cycle.
/// A failed cycle leaves that snapshot in place and only flips the
/// availability flag.
pub struct Coordinator<S> {
    name: String,
    source: Arc<S>,
    clock: Arc<dyn Clock>,
    schedule_config: ScheduleConfig,
    target: Mutex<MonitorTarget>,
    scheduler: Mutex<AdaptiveScheduler>,
    snapshot: watch::Sender<Arc<Snapshot>>,
    status: Mutex<CycleStatus>,
    state: Mutex<CycleState>,
    wake: Notify,
    shutdown: CancellationToken,
}

impl<S: ArrivalSource> Coordinator<S> {
    /// Create an idle coordinator. Nothing is fetched until
    /// [`refresh`](Self::refresh) or [`start`](Self::start).
    pub fn new(
        name: impl Into<String>,
        source: Arc<S>,
        target: MonitorTarget,
        base_period: Duration,
    ) -> Self {
        let schedule_config = ScheduleConfig::default();
        let (snapshot, _) = watch::channel(Arc::new(Snapshot::empty()));

        Self {
            name: name.into(),
            source,
            clock: Arc::new(SystemClock),
            scheduler: Mutex::new(AdaptiveScheduler::new(base_period, schedule_config.clone())),
            schedule_config,
            target: Mutex::new(target),
            snapshot,
            status: Mutex::new(CycleStatus::default()),
            state: Mutex::new(CycleState::Idle),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Use a different clock (for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use different scheduling thresholds.
    pub fn with_schedule(mut self, config: ScheduleConfig) -> Self {
        let base = self.scheduler.get_mut().base();
        self.scheduler = Mutex::new(AdaptiveScheduler::new(base, config.clone()));
        self.schedule_config = config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A copy of the target the next cycle will fetch.
    pub fn target(&self) -> MonitorTarget {
        self.target.lock().clone()
    }

    pub fn state(&self) -> CycleState {
        *self.state.lock()
    }

    /// The period the run loop currently sleeps for.
    pub fn period(&self) -> Duration {
        self.scheduler.lock().current()
    }

    /// The configured default period.
    pub fn base_period(&self) -> Duration {
        self.scheduler.lock().base()
    }

    /// Whether the most recent cycle succeeded.
    pub fn last_update_success(&self) -> bool {
        self.status.lock().available
    }

    /// When the current snapshot was published.
    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.status.lock().last_success_at
    }

    /// The most recent failure, cleared by the next success.
    pub fn last_failure(&self) -> Option<FailureRecord> {
        self.status.lock().last_failure.clone()
    }

    /// The last published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.borrow().clone()
    }

    /// A receiver notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot.subscribe()
    }

    /// All records for a key, soonest first. `None` if the key has no records.
    pub fn latest_for_key(&self, key: &str) -> Option<Vec<ArrivalRecord>> {
        self.snapshot.borrow().get(key).map(<[ArrivalRecord]>::to_vec)
    }

    /// The soonest record for a key.
    pub fn next_for_key(&self, key: &str) -> Option<ArrivalRecord> {
        self.snapshot.borrow().next(key).cloned()
    }

    /// Replace the line filters of a stop target.
    ///
    /// Takes effect on the next cycle; a cycle already in flight keeps the
    /// filters it started with.
    pub fn set_line_filters(&self, lines: LineSet) -> Result<(), CoordinatorError> {
        match &mut *self.target.lock() {
            MonitorTarget::Stop(stop) => {
                info!(coordinator = %self.name, lines = %lines, "Line filters updated");
                stop.lines = lines;
                Ok(())
            }
            MonitorTarget::Route(_) => Err(CoordinatorError::NotAStopTarget),
        }
    }

    /// Ask the run loop for an immediate cycle.
    ///
    /// Does nothing while a cycle is running or after [`stop`](Self::stop).
    pub fn request_refresh(&self) {
        match *self.state.lock() {
            CycleState::Idle => self.wake.notify_one(),
            CycleState::Refreshing => {
                debug!(coordinator = %self.name, "Refresh already in progress, coalescing");
            }
            CycleState::Stopped => {}
        }
    }

    /// Run one cycle now: fetch, normalize, publish, reschedule.
    pub async fn refresh(&self) -> CycleOutcome {
        match self.begin_cycle() {
            CycleState::Idle => {}
            CycleState::Refreshing => return CycleOutcome::Coalesced,
            CycleState::Stopped => return CycleOutcome::Stopped,
        }

        let target = self.target();
        let result = self.fetch(&target).await;

        let outcome = if self.shutdown.is_cancelled() {
            debug!(coordinator = %self.name, "Stopped during fetch, discarding result");
            CycleOutcome::Stopped
        } else {
            match result {
                Ok(snapshot) => {
                    self.publish(snapshot);
                    CycleOutcome::Published
                }
                Err(err) => {
                    let err = CoordinatorError::from(err);
                    self.record_failure(&err);
                    CycleOutcome::Failed(err)
                }
            }
        };

        self.end_cycle();
        outcome
    }

    /// Sleep for the current period (or until woken) and refresh, until stopped.
    ///
    /// A cycle published from outside the loop re-arms the sleep with the
    /// period that cycle chose.
    pub async fn run(self: Arc<Self>) {
        info!(
            coordinator = %self.name,
            period_secs = self.period().as_secs(),
            "Coordinator started"
        );

        let mut published = self.snapshot.subscribe();

        loop {
            let period = self.period();

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                _ = self.wake.notified() => {
                    debug!(coordinator = %self.name, "Refresh requested");
                }

                Ok(()) = published.changed() => {
                    debug!(
                        coordinator = %self.name,
                        period_secs = self.period().as_secs(),
                        "Published elsewhere, rescheduling"
                    );
                    continue;
                }

                _ = tokio::time::sleep(period) => {}
            }

            if self.refresh().await == CycleOutcome::Stopped {
                break;
            }
            published.borrow_and_update();
        }

        info!(coordinator = %self.name, "Coordinator stopped");
    }

    /// Spawn the run loop onto the current runtime.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run())
    }

    /// Stop the run loop.
    ///
    /// An in-flight fetch completes but its result is not published.
    pub fn stop(&self) {
        self.shutdown.cancel();

        let mut state = self.state.lock();
        if *state != CycleState::Refreshing {
            *state = CycleState::Stopped;
        }
    }

    /// Stop this coordinator and build its replacement for a new target.
    ///
    /// The replacement shares the source and clock, starts from an empty
    /// snapshot and is not started.
    pub fn on_config_changed(&self, target: MonitorTarget, base_period: Duration) -> Self {
        self.stop();
        self.successor(target, base_period)
    }

    /// Build a replacement for a new target, leaving this one running.
    ///
    /// The caller stops this coordinator once the replacement is ready.
    pub fn successor(&self, target: MonitorTarget, base_period: Duration) -> Self {
        info!(coordinator = %self.name, slug = %target.slug(), "Rebuilding for new configuration");

        Coordinator::new(
            self.name.clone(),
            Arc::clone(&self.source),
            target,
            base_period,
        )
        .with_clock(Arc::clone(&self.clock))
        .with_schedule(self.schedule_config.clone())
    }

    /// Move Idle to Refreshing, returning the state found.
    fn begin_cycle(&self) -> CycleState {
        let mut state = self.state.lock();
        let found = *state;
        if found == CycleState::Idle {
            *state = CycleState::Refreshing;
        }
        found
    }

    fn end_cycle(&self) {
        let mut state = self.state.lock();
        *state = if self.shutdown.is_cancelled() {
            CycleState::Stopped
        } else {
            CycleState::Idle
        };
    }

    async fn fetch(&self, target: &MonitorTarget) -> Result<Snapshot, ApiError> {
        match target {
            MonitorTarget::Stop(stop) => {
                let raw = self.source.stop_times(stop).await?;
                Ok(convert_stop_times(&raw, self.clock.now()))
            }
            MonitorTarget::Route(route) => {
                let raw = self.source.route_plans(route).await?;
                Ok(convert_itineraries(
                    &raw,
                    self.clock.now(),
                    &route.destination_name,
                ))
            }
        }
    }

    fn publish(&self, snapshot: Snapshot) {
        let soonest = snapshot.soonest_minutes();
        let records = snapshot.record_count();

        self.snapshot.send_replace(Arc::new(snapshot));

        {
            let mut status = self.status.lock();
            status.available = true;
            status.last_success_at = Some(self.clock.now());
            status.last_failure = None;
            status.consecutive_failures = 0;
        }

        debug!(
            coordinator = %self.name,
            records,
            soonest = ?soonest,
            "Published snapshot"
        );

        let hour = self.clock.local_hour();
        if let Some(period) = self.scheduler.lock().recompute(soonest, hour) {
            info!(
                coordinator = %self.name,
                period_secs = period.as_secs(),
                "Refresh period changed"
            );
        }
    }

    fn record_failure(&self, err: &CoordinatorError) {
        let mut status = self.status.lock();
        let consecutive = status.consecutive_failures + 1;
        status.available = false;
        status.consecutive_failures = consecutive;
        status.last_failure = Some(FailureRecord {
            message: err.to_string(),
            at: self.clock.now(),
            consecutive,
        });

        warn!(
            coordinator = %self.name,
            error = %err,
            consecutive_failures = consecutive,
            "Refresh failed, keeping previous data"
        );
    }
}
