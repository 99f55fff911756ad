//! Normalized telemetry readings and the history buffer
//!
//! Raw payloads from the API are decoded in [`wire`] and converted into
//! [`Reading`]s here. A [`HistoryBuffer`] is always ascending by timestamp
//! and unique by timestamp; ingestion enforces both.

mod wire;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::logging::get_logger;
use crate::soc::BatteryState;

pub use wire::{
    BatteryPayload, ConsumptionPayload, CurrentPayload, EnvironmentPayload, HistoryPayload,
    HistoryRow, SolarPayload, parse_timestamp,
};

/// Upstream time-remaining estimate; opaque, passed through for live readings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeRemaining {
    pub is_charging: bool,
    pub is_discharging: bool,
    pub net_power: Option<f64>,
    pub hours_to_full: Option<f64>,
    pub hours_to_empty: Option<f64>,
    pub hours_to_min: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryReading {
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub power: Option<f64>,
    pub state: BatteryState,
    /// SOC as reported by the server, if any; display SOC is always estimated
    pub reported_soc: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolarReading {
    pub power: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub yield_today: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentReading {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

/// A normalized measurement sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub battery: BatteryReading,
    pub solar: SolarReading,
    pub consumption_power: Option<f64>,
    pub environment: EnvironmentReading,
    pub time_remaining: Option<TimeRemaining>,
}

impl Reading {
    /// Empty reading at `timestamp`, every measurement absent
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            battery: BatteryReading::default(),
            solar: SolarReading::default(),
            consumption_power: None,
            environment: EnvironmentReading::default(),
            time_remaining: None,
        }
    }

    pub fn with_battery_voltage(mut self, voltage: f64) -> Self {
        self.battery.voltage = Some(voltage);
        self
    }

    /// Copy of this reading as shown from history: no live estimate
    pub fn as_historical(&self) -> Reading {
        Reading {
            time_remaining: None,
            ..self.clone()
        }
    }
}

/// Counts of history rows rejected during ingestion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub invalid_timestamp: usize,
    pub duplicate_timestamp: usize,
}

/// Readings ascending and unique by timestamp
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryBuffer {
    readings: Vec<Reading>,
}

impl HistoryBuffer {
    /// Build a buffer from readings in any order.
    ///
    /// Readings are stably sorted; for a repeated timestamp the first
    /// occurrence in the input is kept. Returns the number of duplicates
    /// dropped.
    pub fn from_readings(mut readings: Vec<Reading>) -> (Self, usize) {
        let before = readings.len();
        readings.sort_by_key(|r| r.timestamp);
        readings.dedup_by_key(|r| r.timestamp);
        let dropped = before - readings.len();
        (Self { readings }, dropped)
    }

    /// Normalize raw history rows, dropping rows without a usable timestamp
    pub fn from_rows(rows: Vec<HistoryRow>) -> (Self, IngestReport) {
        let total = rows.len();
        let readings: Vec<Reading> = rows.into_iter().filter_map(HistoryRow::into_reading).collect();
        let invalid_timestamp = total - readings.len();
        let (buffer, duplicate_timestamp) = Self::from_readings(readings);

        let report = IngestReport {
            accepted: buffer.len(),
            invalid_timestamp,
            duplicate_timestamp,
        };
        if invalid_timestamp > 0 || duplicate_timestamp > 0 {
            get_logger("telemetry").warn(&format!(
                "History ingestion dropped rows: invalid_timestamp={}, duplicate_timestamp={}",
                invalid_timestamp, duplicate_timestamp
            ));
        }
        (buffer, report)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Reading> {
        self.readings.get(index)
    }

    pub fn last_index(&self) -> Option<usize> {
        self.readings.len().checked_sub(1)
    }

    pub fn newest(&self) -> Option<&Reading> {
        self.readings.last()
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Index of the reading taken exactly at `timestamp`
    pub fn position_of(&self, timestamp: DateTime<Utc>) -> Option<usize> {
        self.readings
            .binary_search_by_key(&timestamp, |r| r.timestamp)
            .ok()
    }

    /// Clamp `index` into `[0, len-1]`; `0` for an empty buffer
    pub fn clamp_index(&self, index: usize) -> usize {
        index.min(self.last_index().unwrap_or(0))
    }

    /// Aggregate statistics over the window
    pub fn summary(&self) -> HistorySummary {
        let solar: Vec<f64> = self.readings.iter().filter_map(|r| r.solar.power).collect();
        let voltages: Vec<f64> = self
            .readings
            .iter()
            .filter_map(|r| r.battery.voltage)
            .collect();

        HistorySummary {
            readings_count: self.readings.len(),
            first: self.readings.first().map(|r| r.timestamp),
            last: self.readings.last().map(|r| r.timestamp),
            solar_peak: solar.iter().copied().reduce(f64::max).map(round2),
            solar_avg: average(&solar).map(round2),
            battery_voltage_min: voltages.iter().copied().reduce(f64::min),
            battery_voltage_max: voltages.iter().copied().reduce(f64::max),
        }
    }
}

/// Window statistics; every value is `None` when nothing was reported
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySummary {
    pub readings_count: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub solar_peak: Option<f64>,
    pub solar_avg: Option<f64>,
    pub battery_voltage_min: Option<f64>,
    pub battery_voltage_max: Option<f64>,
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `HH:MM` label in the timestamp's own zone
pub fn format_clock<Tz>(timestamp: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    timestamp.format("%H:%M").to_string()
}
