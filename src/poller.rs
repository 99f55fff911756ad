//! Refresh cycle and polling schedule
//!
//! A refresh fetches the live snapshot and the history window concurrently
//! and applies each half to the session as soon as it completes. Refreshes
//! never overlap: a second caller waits behind the first, but is counted as
//! in flight from the moment it asks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::{Fetched, TelemetrySource};
use crate::error::HeliosError;
use crate::logging::{StructuredLogger, get_logger};
use crate::session::{ErrorKind, Session};
use crate::store::SessionStore;
use crate::telemetry::{HistoryBuffer, Reading};

/// Shortest schedule period; `tokio::time::interval` rejects zero
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// What happened to one half of a refresh
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HalfOutcome {
    /// Fresh data was written to the session
    Applied,
    /// 2xx with nothing to report; prior data kept
    Empty,
    /// Transport, HTTP status or decoding failure; prior data kept
    Failed(String),
    /// Not completed before teardown
    #[default]
    Abandoned,
}

impl HalfOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Result of a refresh that did not end in a connect error
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RefreshReport {
    pub current: HalfOutcome,
    pub history: HalfOutcome,
    /// Teardown happened before the cycle finished
    pub cancelled: bool,
}

impl RefreshReport {
    fn cancelled(current: HalfOutcome, history: HalfOutcome) -> Self {
        Self {
            current,
            history,
            cancelled: true,
        }
    }
}

/// Keeps the session's in-flight count honest even if the refresh future is
/// dropped mid-way
struct InFlight<'a> {
    store: &'a SessionStore,
}

impl<'a> InFlight<'a> {
    fn enter(store: &'a SessionStore) -> Self {
        store.update(Session::begin_refresh);
        Self { store }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.store.update(Session::end_refresh);
    }
}

pub struct Poller {
    source: Arc<dyn TelemetrySource>,
    store: SessionStore,
    history_hours: u32,
    gate: Mutex<()>,
    logger: StructuredLogger,
}

impl Poller {
    pub fn new(source: Arc<dyn TelemetrySource>, store: SessionStore, history_hours: u32) -> Self {
        Self {
            source,
            store,
            history_hours,
            gate: Mutex::new(()),
            logger: get_logger("poller"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Run one refresh cycle.
    ///
    /// Returns `Err` only when both halves failed; that error is also
    /// recorded on the session. Nothing is applied once `cancel` fires.
    pub async fn refresh(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<RefreshReport, ErrorKind> {
        let _in_flight = InFlight::enter(&self.store);

        let _turn = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(RefreshReport::cancelled(HalfOutcome::Abandoned, HalfOutcome::Abandoned));
            }
            turn = self.gate.lock() => turn,
        };

        let started = Instant::now();
        let current = self.source.fetch_current();
        let history = self.source.fetch_history(self.history_hours);
        tokio::pin!(current, history);

        let mut current_outcome: Option<HalfOutcome> = None;
        let mut history_outcome: Option<HalfOutcome> = None;

        while current_outcome.is_none() || history_outcome.is_none() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.logger.debug("Refresh abandoned on shutdown");
                    return Ok(RefreshReport::cancelled(
                        current_outcome.unwrap_or_default(),
                        history_outcome.unwrap_or_default(),
                    ));
                }
                res = &mut current, if current_outcome.is_none() => {
                    current_outcome = Some(self.apply_current(res));
                }
                res = &mut history, if history_outcome.is_none() => {
                    history_outcome = Some(self.apply_history(res));
                }
            }
        }

        let report = RefreshReport {
            current: current_outcome.unwrap_or_default(),
            history: history_outcome.unwrap_or_default(),
            cancelled: false,
        };
        self.logger.debug(&format!(
            "Refresh finished in {}ms: current={:?}, history={:?}",
            started.elapsed().as_millis(),
            report.current,
            report.history
        ));

        if let (HalfOutcome::Failed(current_err), HalfOutcome::Failed(history_err)) =
            (&report.current, &report.history)
        {
            let error = ErrorKind::connect(format!(
                "current: {}; history: {}",
                current_err, history_err
            ));
            self.logger.error(&error.banner());
            let recorded = error.clone();
            self.store.update(|s| s.record_error(recorded));
            return Err(error);
        }

        self.store.update(Session::clear_error);
        Ok(report)
    }

    fn apply_current(&self, res: crate::error::Result<Fetched<Reading>>) -> HalfOutcome {
        match res {
            Ok(Fetched::Data(reading)) => {
                let received_at = Utc::now();
                self.store.update(|s| s.apply_snapshot(reading, received_at));
                HalfOutcome::Applied
            }
            Ok(Fetched::Empty) => HalfOutcome::Empty,
            Err(e) => self.half_failed("current", e),
        }
    }

    fn apply_history(&self, res: crate::error::Result<Fetched<HistoryBuffer>>) -> HalfOutcome {
        match res {
            Ok(Fetched::Data(buffer)) => {
                self.store.update(|s| s.apply_history(buffer));
                HalfOutcome::Applied
            }
            Ok(Fetched::Empty) => HalfOutcome::Empty,
            Err(e) => self.half_failed("history", e),
        }
    }

    /// Transport failures log at warn, status and decode failures at error
    fn half_failed(&self, half: &str, error: HeliosError) -> HalfOutcome {
        if error.is_transport() {
            self.logger.warn(&format!("{} unreachable: {}", half, error));
        } else {
            self.logger.error(&format!("{} answered badly: {}", half, error));
        }
        HalfOutcome::Failed(error.to_string())
    }

    /// Refresh immediately, then every `interval` until `cancel` fires.
    /// Intervals below [`MIN_POLL_INTERVAL`] are raised to it.
    pub async fn run_schedule(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let interval = if interval < MIN_POLL_INTERVAL {
            self.logger.warn(&format!(
                "Poll interval {:?} too short, using {:?}",
                interval, MIN_POLL_INTERVAL
            ));
            MIN_POLL_INTERVAL
        } else {
            interval
        };
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.logger.info(&format!("Polling every {}ms", interval.as_millis()));

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // Connect errors are already on the session
            let _ = self.refresh(&cancel).await;
        }

        self.logger.info("Polling stopped");
    }
}
