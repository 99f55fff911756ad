//! Telemetry API client
//!
//! [`TelemetrySource`] is the seam the poller fetches through; the HTTP
//! implementation talks to the `/api/current`, `/api/history` and
//! `/api/health` endpoints.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::ApiConfig;
use crate::error::{HeliosError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::telemetry::{CurrentPayload, HistoryBuffer, HistoryPayload, Reading};

/// Outcome of a successful (2xx, decodable) fetch
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Data(T),
    /// The server answered but had nothing to report this tick
    Empty,
}

impl<T> Fetched<T> {
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Data(data) => Some(data),
            Self::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// `GET /api/health`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HealthStatus {
    pub status: String,
    pub vrm_connected: Option<bool>,
}

/// Where readings come from
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Latest live snapshot
    async fn fetch_current(&self) -> Result<Fetched<Reading>>;

    /// History for the last `hours` hours
    async fn fetch_history(&self, hours: u32) -> Result<Fetched<HistoryBuffer>>;

    /// Backend liveness
    async fn health(&self) -> Result<HealthStatus> {
        Err(HeliosError::generic("health probe not supported"))
    }
}

/// reqwest-backed source
pub struct HttpTelemetrySource {
    client: reqwest::Client,
    base_url: String,
    logger: StructuredLogger,
}

impl HttpTelemetrySource {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("helios/", env!("APP_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            logger: get_logger("client"),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).query(query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            self.logger.warn(&format!("GET {} returned {}", path, status));
            return Err(HeliosError::http(path, status.as_u16()));
        }
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetrySource {
    async fn fetch_current(&self) -> Result<Fetched<Reading>> {
        let payload: CurrentPayload = self.get_json("/api/current", &[]).await?;
        if payload.has_error() {
            self.logger.debug("Current endpoint reported no data");
        }
        Ok(payload
            .into_reading(Utc::now())
            .map_or(Fetched::Empty, Fetched::Data))
    }

    async fn fetch_history(&self, hours: u32) -> Result<Fetched<HistoryBuffer>> {
        let payload: HistoryPayload = self
            .get_json("/api/history", &[("hours", hours.to_string())])
            .await?;
        if payload.has_error() {
            self.logger.debug("History endpoint reported no data");
            return Ok(Fetched::Empty);
        }
        let (buffer, report) = HistoryBuffer::from_rows(payload.readings);
        self.logger.trace(&format!(
            "History window: {} readings over {}h",
            report.accepted, hours
        ));
        // An empty window is data: it replaces whatever was shown before
        Ok(Fetched::Data(buffer))
    }

    async fn health(&self) -> Result<HealthStatus> {
        self.get_json("/api/health", &[]).await
    }
}
