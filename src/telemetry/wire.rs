//! JSON payloads served by the telemetry API
//!
//! Measurement fields are decoded leniently: numbers and numeric strings are
//! accepted, anything else becomes `None` instead of failing the whole body.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{BatteryReading, EnvironmentReading, Reading, SolarReading, TimeRemaining};
use crate::soc::BatteryState;

/// `GET /api/current`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CurrentPayload {
    /// Logical "no data" marker; any non-null value empties the tick
    pub error: Option<Value>,
    pub timestamp: Option<Value>,
    pub battery: Option<BatteryPayload>,
    pub solar: Option<SolarPayload>,
    pub consumption: Option<ConsumptionPayload>,
    pub environment: Option<EnvironmentPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BatteryPayload {
    #[serde(deserialize_with = "lenient_f64")]
    pub soc: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub voltage: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub current: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub power: Option<f64>,
    pub state: Option<Value>,
    #[serde(deserialize_with = "lenient_time_remaining")]
    pub time_remaining: Option<TimeRemaining>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SolarPayload {
    #[serde(deserialize_with = "lenient_f64")]
    pub power: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub voltage: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub current: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub yield_today: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConsumptionPayload {
    #[serde(deserialize_with = "lenient_f64")]
    pub power: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnvironmentPayload {
    #[serde(deserialize_with = "lenient_f64")]
    pub temperature: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub humidity: Option<f64>,
}

/// `GET /api/history?hours=N`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryPayload {
    pub error: Option<Value>,
    pub readings: Vec<HistoryRow>,
}

/// One flat history row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryRow {
    pub timestamp: Value,
    #[serde(deserialize_with = "lenient_f64")]
    pub battery_voltage: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub battery_current: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub battery_power: Option<f64>,
    pub battery_state: Option<Value>,
    #[serde(deserialize_with = "lenient_f64")]
    pub solar_power: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub solar_voltage: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub solar_current: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub solar_yield_today: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub temperature: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub humidity: Option<f64>,
}

impl CurrentPayload {
    pub fn has_error(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.is_null())
    }

    /// Normalize into a reading; `None` when the server flagged "no data".
    /// A missing or unparseable timestamp falls back to `received_at`.
    pub fn into_reading(self, received_at: DateTime<Utc>) -> Option<Reading> {
        if self.has_error() {
            return None;
        }
        let timestamp = self
            .timestamp
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or(received_at);
        let battery = self.battery.unwrap_or_default();
        let solar = self.solar.unwrap_or_default();
        let environment = self.environment.unwrap_or_default();
        Some(Reading {
            timestamp,
            battery: BatteryReading {
                voltage: battery.voltage,
                current: battery.current,
                power: battery.power,
                state: battery
                    .state
                    .as_ref()
                    .map(BatteryState::from_raw)
                    .unwrap_or_default(),
                reported_soc: battery.soc,
            },
            solar: SolarReading {
                power: solar.power,
                voltage: solar.voltage,
                current: solar.current,
                yield_today: solar.yield_today,
            },
            consumption_power: self.consumption.and_then(|c| c.power),
            environment: EnvironmentReading {
                temperature: environment.temperature,
                humidity: environment.humidity,
            },
            time_remaining: battery.time_remaining,
        })
    }
}

impl HistoryPayload {
    pub fn has_error(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.is_null())
    }
}

impl HistoryRow {
    /// Normalize a row; rows without a usable timestamp yield `None`
    pub fn into_reading(self) -> Option<Reading> {
        let timestamp = parse_timestamp(&self.timestamp)?;
        Some(Reading {
            timestamp,
            battery: BatteryReading {
                voltage: self.battery_voltage,
                current: self.battery_current,
                power: self.battery_power,
                state: self
                    .battery_state
                    .as_ref()
                    .map(BatteryState::from_raw)
                    .unwrap_or_default(),
                reported_soc: None,
            },
            solar: SolarReading {
                power: self.solar_power,
                voltage: self.solar_voltage,
                current: self.solar_current,
                yield_today: self.solar_yield_today,
            },
            consumption_power: None,
            environment: EnvironmentReading {
                temperature: self.temperature,
                humidity: self.humidity,
            },
            time_remaining: None,
        })
    }
}

/// Epoch values above this are taken to be milliseconds
const EPOCH_MILLIS_THRESHOLD: f64 = 1.0e11;

/// Parse an RFC 3339 string, a naive ISO-8601 string (taken as UTC), or
/// epoch seconds (milliseconds when implausibly large for seconds)
pub fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    s.parse::<f64>().ok().and_then(from_epoch)
}

fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let millis = if value.abs() > EPOCH_MILLIS_THRESHOLD {
        value
    } else {
        value * 1000.0
    };
    Utc.timestamp_millis_opt(millis.round() as i64).single()
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
    .filter(|v| v.is_finite()))
}

fn lenient_time_remaining<'de, D>(deserializer: D) -> Result<Option<TimeRemaining>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| serde_json::from_value(v).ok()))
}
