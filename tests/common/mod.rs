#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use helios::client::{Fetched, HealthStatus, TelemetrySource};
use helios::error::{HeliosError, Result};
use helios::session::Session;
use helios::store::SessionStore;
use helios::telemetry::{HistoryBuffer, Reading};
use tokio::sync::Semaphore;

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 10, minute, 0).unwrap()
}

pub fn snapshot(minute: u32, voltage: f64) -> Reading {
    Reading::empty(at(minute)).with_battery_voltage(voltage)
}

pub fn history(minutes: &[u32]) -> HistoryBuffer {
    let readings = minutes.iter().map(|&m| snapshot(m, 12.2)).collect();
    HistoryBuffer::from_readings(readings).0
}

pub fn refused() -> HeliosError {
    HeliosError::network("connection refused")
}

/// Scripted source; each fetch pops the next queued result (default: empty)
/// and, when gated, first waits for a permit
#[derive(Default)]
pub struct FakeSource {
    current: Mutex<VecDeque<Result<Fetched<Reading>>>>,
    history: Mutex<VecDeque<Result<Fetched<HistoryBuffer>>>>,
    pub current_gate: Option<Arc<Semaphore>>,
    pub history_gate: Option<Arc<Semaphore>>,
    pub current_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gate_current(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.current_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn gate_history(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.history_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn push_current(&self, result: Result<Fetched<Reading>>) {
        self.current.lock().unwrap().push_back(result);
    }

    pub fn push_history(&self, result: Result<Fetched<HistoryBuffer>>) {
        self.history.lock().unwrap().push_back(result);
    }

    pub fn current_calls(&self) -> usize {
        self.current_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }
}

async fn pass(gate: &Option<Arc<Semaphore>>) {
    if let Some(gate) = gate {
        gate.acquire().await.unwrap().forget();
    }
}

#[async_trait]
impl TelemetrySource for FakeSource {
    async fn fetch_current(&self) -> Result<Fetched<Reading>> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        pass(&self.current_gate).await;
        self.current
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Fetched::Empty))
    }

    async fn fetch_history(&self, _hours: u32) -> Result<Fetched<HistoryBuffer>> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        pass(&self.history_gate).await;
        self.history
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Fetched::Empty))
    }

    async fn health(&self) -> Result<HealthStatus> {
        Ok(HealthStatus {
            status: "healthy".to_string(),
            vrm_connected: Some(true),
        })
    }
}

/// Wait until the session satisfies `pred`
pub async fn wait_until(store: &SessionStore, pred: impl Fn(&Session) -> bool) {
    let mut rx = store.subscribe();
    tokio::time::timeout(Duration::from_secs(2), async move {
        loop {
            let done = pred(&rx.borrow_and_update());
            if done {
                return;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("session never reached the expected state");
}

/// Poll `cond` until it holds
pub async fn eventually(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}
