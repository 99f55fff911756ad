//! Wires the telemetry source, session store and poller together
//!
//! [`Monitor::start`] spawns the polling schedule and returns a
//! [`MonitorHandle`] for the presentation layer. Dropping the handle without
//! calling [`MonitorHandle::shutdown`] still stops the schedule.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{HttpTelemetrySource, TelemetrySource};
use crate::config::Config;
use crate::error::Result;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::poller::{Poller, RefreshReport};
use crate::session::{Display, ErrorKind, Session};
use crate::store::SessionStore;

pub struct Monitor;

impl Monitor {
    /// Start polling the API configured in `config`
    pub async fn start(config: &Config) -> Result<MonitorHandle> {
        let source = HttpTelemetrySource::new(&config.api)?;
        Ok(Self::start_with_source(
            Arc::new(source),
            config.api.history_hours,
            config.poll_interval(),
        ))
    }

    /// Start polling an arbitrary source
    pub fn start_with_source(
        source: Arc<dyn TelemetrySource>,
        history_hours: u32,
        poll_interval: Duration,
    ) -> MonitorHandle {
        let session_id = uuid::Uuid::new_v4().to_string();
        let logger = get_logger_with_context(
            LogContext::new("monitor").with_session_id(session_id.clone()),
        );
        let poller_logger = get_logger_with_context(
            LogContext::new("poller")
                .with_session_id(session_id.clone())
                .with_field("history_hours", history_hours.to_string()),
        );

        let store = SessionStore::new();
        let poller = Arc::new(
            Poller::new(source.clone(), store.clone(), history_hours).with_logger(poller_logger),
        );
        let cancel = CancellationToken::new();

        let schedule = tokio::spawn({
            let poller = poller.clone();
            let cancel = cancel.clone();
            let logger = logger.clone();
            async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    health = source.health() => match health {
                        Ok(h) => logger.info(&format!(
                            "Telemetry API health: status={}, vrm_connected={:?}",
                            h.status, h.vrm_connected
                        )),
                        Err(e) => logger.warn(&format!("Telemetry API health probe failed: {}", e)),
                    },
                }
                poller.run_schedule(poll_interval, cancel).await;
            }
        });

        logger.info("Monitor started");
        MonitorHandle {
            poller,
            store,
            cancel,
            schedule: Some(schedule),
            session_id,
            logger,
        }
    }
}

pub struct MonitorHandle {
    poller: Arc<Poller>,
    store: SessionStore,
    cancel: CancellationToken,
    schedule: Option<JoinHandle<()>>,
    session_id: String,
    logger: StructuredLogger,
}

impl MonitorHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Manual refresh; queues behind a scheduled one already running
    pub async fn refresh(&self) -> std::result::Result<RefreshReport, ErrorKind> {
        self.poller.refresh(&self.cancel).await
    }

    pub fn scrub(&self, index: usize) {
        self.store.scrub(index);
    }

    pub fn go_live(&self) {
        self.store.go_live();
    }

    pub fn display(&self) -> Display {
        self.store.display()
    }

    pub fn session(&self) -> Session {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.store.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the schedule and wait for it to finish
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(schedule) = self.schedule.take()
            && let Err(e) = schedule.await
        {
            self.logger.error(&format!("Polling task ended abnormally: {}", e));
        }
        self.logger.info("Monitor stopped");
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
