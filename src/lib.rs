//! # Helios - off-grid power telemetry client
//!
//! Polls a Victron telemetry API for the live battery/solar snapshot and a
//! rolling history window, and reconciles both into a single reading for
//! display. A user can scrub back through history; the session keeps the
//! live cursor advancing underneath while they are paused in the past.
//!
//! ## Architecture
//!
//! - `soc`: voltage to state-of-charge estimation over a discharge curve
//! - `telemetry`: normalized readings, API payloads and the history buffer
//! - `session`: the Live/History state machine and display derivation
//! - `store`: single-writer owner of the session, with change notification
//! - `client`: HTTP telemetry source
//! - `poller`: refresh cycle and cancellable polling schedule
//! - `monitor`: composition root handed to the presentation layer
//! - `settings`: key-value user preferences (theme)
//! - `config`: YAML configuration with environment overrides
//! - `logging`: structured logging and tracing

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod poller;
pub mod session;
pub mod settings;
pub mod soc;
pub mod store;
pub mod telemetry;


// Re-export commonly used types
pub use config::Config;
pub use error::{HeliosError, Result};
pub use monitor::{Monitor, MonitorHandle};
pub use session::{Display, Mode, Session};
pub use soc::estimate_soc;

/// Version string baked in at build time
pub const VERSION: &str = env!("APP_VERSION");
