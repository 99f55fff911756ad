//! Live/History session state
//!
//! [`Session`] holds everything the presentation layer needs to decide what
//! to render: the latest live snapshot, the most recent history window, the
//! scrub cursor and the connection error banner. All transitions are plain
//! synchronous methods with no I/O; [`Session::display`] derives the reading
//! to show from an immutable session.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::soc::{SocBand, estimate_soc};
use crate::telemetry::{HistoryBuffer, Reading, format_clock};

/// Which reading the display follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Track the newest snapshot
    #[default]
    Live,
    /// Pinned to a user-selected history point
    History,
}

/// Session-level error shown to the user until a later cycle succeeds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Neither endpoint could be reached or decoded
    Connect { message: String },
}

impl ErrorKind {
    pub fn connect<S: Into<String>>(message: S) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Banner text
    pub fn banner(&self) -> String {
        match self {
            Self::Connect { message } => format!("Failed to connect: {}", message),
        }
    }
}

/// View state for one client run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Session {
    mode: Mode,
    cursor_index: usize,
    last_live_snapshot: Option<Reading>,
    history: Option<HistoryBuffer>,
    last_error: Option<ErrorKind>,
    in_flight: usize,
    last_update: Option<DateTime<Utc>>,
}

impl Session {
    /// Fresh session: live mode, nothing received yet
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_live(&self) -> bool {
        self.mode == Mode::Live
    }

    pub fn cursor_index(&self) -> usize {
        self.cursor_index
    }

    pub fn last_live_snapshot(&self) -> Option<&Reading> {
        self.last_live_snapshot.as_ref()
    }

    pub fn history(&self) -> Option<&HistoryBuffer> {
        self.history.as_ref()
    }

    pub fn history_len(&self) -> usize {
        self.history.as_ref().map_or(0, HistoryBuffer::len)
    }

    pub fn last_error(&self) -> Option<&ErrorKind> {
        self.last_error.as_ref()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight > 0
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Timestamp of the history point under the cursor, history mode only
    fn selected_timestamp(&self) -> Option<DateTime<Utc>> {
        if self.mode != Mode::History {
            return None;
        }
        self.history
            .as_ref()
            .and_then(|h| h.get(self.cursor_index))
            .map(|r| r.timestamp)
    }

    /// Store a newly fetched live snapshot
    pub fn apply_snapshot(&mut self, snapshot: Reading, received_at: DateTime<Utc>) {
        self.last_live_snapshot = Some(snapshot);
        self.last_update = Some(received_at);
    }

    /// Replace the history window wholesale.
    ///
    /// Live mode moves the cursor to the newest point. History mode keeps the
    /// cursor on the selected timestamp when it is still present, otherwise
    /// clamps it into the new buffer.
    pub fn apply_history(&mut self, history: HistoryBuffer) {
        let selected = self.selected_timestamp();
        self.cursor_index = match self.mode {
            Mode::Live => history.last_index().unwrap_or(self.cursor_index),
            Mode::History => selected
                .and_then(|ts| history.position_of(ts))
                .unwrap_or_else(|| history.clamp_index(self.cursor_index)),
        };
        self.history = Some(history);
    }

    /// Apply whichever halves of a refresh arrived
    pub fn apply(
        &mut self,
        snapshot: Option<Reading>,
        history: Option<HistoryBuffer>,
        received_at: DateTime<Utc>,
    ) {
        if let Some(snapshot) = snapshot {
            self.apply_snapshot(snapshot, received_at);
        }
        if let Some(history) = history {
            self.apply_history(history);
        }
    }

    /// User selected a history point; always leaves live mode
    pub fn scrub(&mut self, index: usize) {
        self.mode = Mode::History;
        self.cursor_index = self
            .history
            .as_ref()
            .map_or(0, |h| h.clamp_index(index));
    }

    /// Return to live tracking
    pub fn go_live(&mut self) {
        self.mode = Mode::Live;
        if let Some(last) = self.history.as_ref().and_then(HistoryBuffer::last_index) {
            self.cursor_index = last;
        }
    }

    pub fn record_error(&mut self, error: ErrorKind) {
        self.last_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn begin_refresh(&mut self) {
        self.in_flight += 1;
    }

    pub fn end_refresh(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Reading to render right now
    pub fn display(&self) -> Display {
        match self.mode {
            Mode::Live => self
                .last_live_snapshot
                .clone()
                .map_or(Display::Placeholder, Display::Reading),
            Mode::History => self
                .history
                .as_ref()
                .filter(|h| !h.is_empty())
                .and_then(|h| h.get(h.clamp_index(self.cursor_index)))
                .map_or(Display::NoHistory, |r| Display::Reading(r.as_historical())),
        }
    }
}

/// Resolved display reading
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "reading", rename_all = "snake_case")]
pub enum Display {
    Reading(Reading),
    /// Live mode before the first snapshot
    Placeholder,
    /// History mode with an empty buffer
    NoHistory,
}

impl Display {
    pub fn reading(&self) -> Option<&Reading> {
        match self {
            Self::Reading(r) => Some(r),
            _ => None,
        }
    }

    /// SOC estimated from the displayed battery voltage
    pub fn soc(&self) -> Option<u8> {
        self.reading().and_then(|r| estimate_soc(r.battery.voltage))
    }

    pub fn band(&self) -> SocBand {
        SocBand::from_soc(self.soc())
    }

    /// One-line text form
    pub fn summary_line(&self) -> String {
        let reading = match self {
            Self::Reading(r) => r,
            Self::Placeholder => return "waiting for data".to_string(),
            Self::NoHistory => return "no historical data yet".to_string(),
        };
        let soc = self
            .soc()
            .map_or_else(|| "--".to_string(), |s| format!("{}%", s));
        let mut line = format!(
            "{} battery {} {} {} ({}) solar {} temp {} hum {}",
            format_clock(&reading.timestamp),
            fmt_opt(reading.battery.voltage, "V", 2),
            soc,
            reading.battery.state.label(),
            self.band().as_str(),
            fmt_opt(reading.solar.power, "W", 0),
            fmt_opt(reading.environment.temperature, "C", 1),
            fmt_opt(reading.environment.humidity, "%", 0),
        );
        if let Some(tr) = &reading.time_remaining {
            let remaining = if tr.is_charging {
                tr.hours_to_full.map(|h| format!(" full in {:.1}h", h))
            } else if tr.is_discharging {
                tr.hours_to_empty.map(|h| format!(" empty in {:.1}h", h))
            } else {
                None
            };
            if let Some(remaining) = remaining {
                line.push_str(&remaining);
            }
        }
        line
    }
}

fn fmt_opt(value: Option<f64>, unit: &str, precision: usize) -> String {
    value.map_or_else(
        || "--".to_string(),
        |v| format!("{:.*}{}", precision, v, unit),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TimeRemaining;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, minute, 0).unwrap()
    }

    fn reading(minute: u32, voltage: f64) -> Reading {
        Reading::empty(at(minute)).with_battery_voltage(voltage)
    }

    fn live_snapshot(minute: u32) -> Reading {
        let mut r = reading(minute, 12.50);
        r.time_remaining = Some(TimeRemaining {
            is_discharging: true,
            net_power: Some(-20.0),
            hours_to_empty: Some(42.0),
            ..Default::default()
        });
        r
    }

    fn buffer(minutes: &[u32]) -> HistoryBuffer {
        let readings = minutes
            .iter()
            .map(|&m| {
                let mut r = reading(m, 12.0 + f64::from(m) / 100.0);
                r.time_remaining = Some(TimeRemaining::default());
                r
            })
            .collect();
        HistoryBuffer::from_readings(readings).0
    }

    #[test]
    fn new_session_shows_placeholder() {
        let session = Session::new();
        assert_eq!(session.mode(), Mode::Live);
        assert_eq!(session.display(), Display::Placeholder);
        assert!(session.history().is_none());
        assert!(!session.is_refreshing());
        assert_eq!(session.display().soc(), None);
        assert_eq!(session.display().band(), SocBand::Unknown);
    }

    #[test]
    fn live_display_is_snapshot_verbatim() {
        let mut session = Session::new();
        let snap = live_snapshot(30);
        session.apply(Some(snap.clone()), Some(buffer(&[1, 2, 3])), at(30));

        assert_eq!(session.display(), Display::Reading(snap));
        assert_eq!(session.cursor_index(), 2);
        assert_eq!(session.last_update(), Some(at(30)));
        assert_eq!(session.display().soc(), Some(90));
    }

    #[test]
    fn applying_same_data_twice_is_idempotent() {
        let mut session = Session::new();
        session.apply(Some(live_snapshot(30)), Some(buffer(&[1, 2, 3])), at(30));
        let first = session.display();
        let state = session.clone();
        session.apply(Some(live_snapshot(30)), Some(buffer(&[1, 2, 3])), at(30));
        assert_eq!(session.display(), first);
        assert_eq!(session, state);
    }

    #[test]
    fn live_cursor_follows_newest_point() {
        let mut session = Session::new();
        session.apply_history(buffer(&[1, 2]));
        assert_eq!(session.cursor_index(), 1);
        session.apply_history(buffer(&[1, 2, 3, 4]));
        assert_eq!(session.cursor_index(), 3);
    }

    #[test]
    fn scrub_enters_history_and_strips_estimate() {
        let mut session = Session::new();
        session.apply(Some(live_snapshot(30)), Some(buffer(&[1, 2, 3])), at(30));
        session.scrub(1);

        assert_eq!(session.mode(), Mode::History);
        assert_eq!(session.cursor_index(), 1);
        let shown = session.display();
        let r = shown.reading().unwrap();
        assert_eq!(r.timestamp, at(2));
        assert!(r.time_remaining.is_none());
        let stored = session.history().unwrap().get(1).unwrap();
        assert!(stored.time_remaining.is_some());
        assert_eq!(r.battery, stored.battery);
    }

    #[test]
    fn scrub_clamps_to_buffer() {
        let mut session = Session::new();
        session.apply_history(buffer(&[1, 2, 3]));
        session.scrub(99);
        assert_eq!(session.cursor_index(), 2);
        session.scrub(0);
        assert_eq!(session.cursor_index(), 0);
    }

    #[test]
    fn scrub_without_history_shows_no_history() {
        let mut session = Session::new();
        session.apply_snapshot(live_snapshot(5), at(5));
        session.scrub(4);
        assert_eq!(session.mode(), Mode::History);
        assert_eq!(session.cursor_index(), 0);
        assert_eq!(session.display(), Display::NoHistory);
        assert_eq!(session.display().summary_line(), "no historical data yet");

        session.apply_history(HistoryBuffer::default());
        assert_eq!(session.display(), Display::NoHistory);
    }

    #[test]
    fn scrub_then_go_live_snaps_to_edge() {
        for index in 0..4 {
            let mut session = Session::new();
            session.apply(Some(live_snapshot(30)), Some(buffer(&[1, 2, 3, 4])), at(30));
            session.scrub(index);
            session.go_live();
            assert_eq!(session.mode(), Mode::Live);
            assert_eq!(session.cursor_index(), 3);
            assert_eq!(session.display(), Display::Reading(live_snapshot(30)));
        }
    }

    #[test]
    fn go_live_without_history_leaves_cursor() {
        let mut session = Session::new();
        session.scrub(3);
        session.go_live();
        assert_eq!(session.mode(), Mode::Live);
        assert_eq!(session.cursor_index(), 0);
        assert_eq!(session.display(), Display::Placeholder);
    }

    #[test]
    fn go_live_while_live_is_idempotent() {
        let mut session = Session::new();
        session.apply(Some(live_snapshot(30)), Some(buffer(&[1, 2, 3])), at(30));
        let before = session.clone();
        session.go_live();
        assert_eq!(session, before);
    }

    #[test]
    fn scrub_to_live_edge_in_history_is_idempotent() {
        let mut session = Session::new();
        session.apply_history(buffer(&[1, 2, 3]));
        session.scrub(2);
        let before = session.clone();
        session.scrub(2);
        assert_eq!(session, before);
    }

    #[test]
    fn history_mode_keeps_selected_timestamp() {
        let mut session = Session::new();
        session.apply_history(buffer(&[1, 2, 3, 4]));
        session.scrub(2);
        // window slid: oldest point gone, newer ones appended
        session.apply_history(buffer(&[2, 3, 4, 5, 6]));
        assert_eq!(session.mode(), Mode::History);
        assert_eq!(session.cursor_index(), 1);
        assert_eq!(session.display().reading().unwrap().timestamp, at(3));
    }

    #[test]
    fn shrinking_history_clamps_cursor() {
        let mut session = Session::new();
        session.apply_history(buffer(&[1, 2, 3, 4, 5]));
        session.scrub(4);
        session.apply_history(buffer(&[10, 11]));
        assert_eq!(session.cursor_index(), 1);
        assert_eq!(session.display().reading().unwrap().timestamp, at(11));

        session.apply_history(HistoryBuffer::default());
        assert_eq!(session.cursor_index(), 0);
        assert_eq!(session.display(), Display::NoHistory);
    }

    #[test]
    fn live_snapshot_arrival_in_history_mode_does_not_move_display() {
        let mut session = Session::new();
        session.apply_history(buffer(&[1, 2, 3]));
        session.scrub(0);
        session.apply_snapshot(live_snapshot(40), at(40));
        assert_eq!(session.display().reading().unwrap().timestamp, at(1));
        session.go_live();
        assert_eq!(session.display().reading().unwrap().timestamp, at(40));
    }

    #[test]
    fn error_banner_and_refresh_counter() {
        let mut session = Session::new();
        session.record_error(ErrorKind::connect("connection refused"));
        assert_eq!(
            session.last_error().map(ErrorKind::banner),
            Some("Failed to connect: connection refused".to_string())
        );
        session.clear_error();
        assert!(session.last_error().is_none());

        session.begin_refresh();
        session.begin_refresh();
        assert!(session.is_refreshing());
        session.end_refresh();
        assert!(session.is_refreshing());
        session.end_refresh();
        session.end_refresh();
        assert_eq!(session.in_flight(), 0);
        assert!(!session.is_refreshing());
    }

    #[test]
    fn summary_line_formats_reading() {
        let mut snap = live_snapshot(7);
        snap.solar.power = Some(118.4);
        snap.environment.temperature = Some(21.46);
        let line = Display::Reading(snap).summary_line();
        assert_eq!(
            line,
            "10:07 battery 12.50V 90% Unknown (good) solar 118W temp 21.5C hum -- empty in 42.0h"
        );
        assert_eq!(Display::Placeholder.summary_line(), "waiting for data");
    }
}
