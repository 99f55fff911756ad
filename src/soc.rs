//! Battery state-of-charge estimation
//!
//! Maps a resting battery terminal voltage onto a state of charge by
//! piecewise-linear interpolation over an empirical discharge curve, plus the
//! small total classifiers consumed by the presentation layer.

use crate::error::{HeliosError, Result};
use crate::logging::get_logger;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Once;

/// One anchor of a discharge curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageSocPoint {
    pub voltage: f64,
    pub soc: u8,
}

const fn point(voltage: f64, soc: u8) -> VoltageSocPoint {
    VoltageSocPoint { voltage, soc }
}

/// Resting-voltage curve for a 12 V lead-acid/AGM bank at 25 °C
pub const LEAD_ACID_12V: [VoltageSocPoint; 11] = [
    point(12.70, 100),
    point(12.50, 90),
    point(12.42, 80),
    point(12.32, 70),
    point(12.20, 60),
    point(12.06, 50),
    point(11.90, 40),
    point(11.75, 30),
    point(11.58, 20),
    point(11.31, 10),
    point(10.50, 0),
];

/// A validated discharge curve: first anchor 100 %, last anchor 0 %,
/// voltages strictly descending, SOC never increasing
#[derive(Debug, Clone, PartialEq)]
pub struct DischargeCurve {
    points: Vec<VoltageSocPoint>,
}

impl DischargeCurve {
    /// Build a curve, rejecting anchor tables that would yield non-monotonic SOC
    pub fn new(points: &[VoltageSocPoint]) -> Result<Self> {
        if points.len() < 2 {
            return Err(HeliosError::malformed_curve(format!(
                "need at least 2 anchors, got {}",
                points.len()
            )));
        }
        if let Some(p) = points.iter().find(|p| !p.voltage.is_finite()) {
            return Err(HeliosError::malformed_curve(format!(
                "non-finite voltage at soc {}",
                p.soc
            )));
        }
        if let Some(p) = points.iter().find(|p| p.soc > 100) {
            return Err(HeliosError::malformed_curve(format!(
                "soc {} above 100 at {:.2} V",
                p.soc, p.voltage
            )));
        }
        let (first, last) = (points[0], points[points.len() - 1]);
        if first.soc != 100 || last.soc != 0 {
            return Err(HeliosError::malformed_curve(format!(
                "anchors must run from 100 to 0, got {} to {}",
                first.soc, last.soc
            )));
        }
        for pair in points.windows(2) {
            let (upper, lower) = (pair[0], pair[1]);
            if lower.voltage >= upper.voltage {
                return Err(HeliosError::malformed_curve(format!(
                    "voltages not strictly descending: {:.2} V followed by {:.2} V",
                    upper.voltage, lower.voltage
                )));
            }
            if lower.soc > upper.soc {
                return Err(HeliosError::malformed_curve(format!(
                    "soc rises from {} to {} as voltage drops to {:.2} V",
                    upper.soc, lower.soc, lower.voltage
                )));
            }
        }
        Ok(Self {
            points: points.to_vec(),
        })
    }

    pub fn points(&self) -> &[VoltageSocPoint] {
        &self.points
    }

    pub fn max_voltage(&self) -> f64 {
        self.points[0].voltage
    }

    pub fn min_voltage(&self) -> f64 {
        self.points[self.points.len() - 1].voltage
    }

    /// Interpolated SOC; `None` in, `None` out
    ///
    /// Rounds half away from zero, which for the non-negative SOC range is
    /// the same as rounding half up.
    pub fn estimate(&self, voltage: Option<f64>) -> Option<u8> {
        let v = voltage.filter(|v| !v.is_nan())?;
        if v >= self.max_voltage() {
            return Some(100);
        }
        if v <= self.min_voltage() {
            return Some(0);
        }
        self.points.windows(2).find_map(|pair| {
            let (upper, lower) = (pair[0], pair[1]);
            (v <= upper.voltage && v > lower.voltage).then(|| {
                let ratio = (v - lower.voltage) / (upper.voltage - lower.voltage);
                let span = f64::from(upper.soc) - f64::from(lower.soc);
                let soc = f64::from(lower.soc) + ratio * span;
                soc.round().clamp(0.0, 100.0) as u8
            })
        })
    }
}

static MALFORMED_ONCE: Once = Once::new();

static REFERENCE_CURVE: Lazy<DischargeCurve> = Lazy::new(|| {
    match DischargeCurve::new(&LEAD_ACID_12V) {
        Ok(curve) => curve,
        Err(e) => {
            if cfg!(debug_assertions) {
                panic!("reference discharge curve rejected: {e}");
            }
            MALFORMED_ONCE.call_once(|| {
                get_logger("soc").error(&format!("Reference discharge curve rejected: {}", e));
            });
            // Keep serving the anchors as authored; only the endpoints are trusted
            DischargeCurve {
                points: LEAD_ACID_12V.to_vec(),
            }
        }
    }
});

/// The process-wide reference curve
pub fn reference_curve() -> &'static DischargeCurve {
    &REFERENCE_CURVE
}

/// Estimate SOC from a battery terminal voltage using the reference curve
pub fn estimate_soc(voltage: Option<f64>) -> Option<u8> {
    reference_curve().estimate(voltage)
}

/// Coarse severity bucket for a state of charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocBand {
    Critical,
    Low,
    Medium,
    Good,
    Unknown,
}

impl SocBand {
    pub fn from_soc(soc: Option<u8>) -> Self {
        match soc {
            Some(s) if s > 100 => Self::Unknown,
            Some(s) if s >= 80 => Self::Good,
            Some(s) if s >= 50 => Self::Medium,
            Some(s) if s >= 20 => Self::Low,
            Some(_) => Self::Critical,
            None => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::Good => "good",
            Self::Unknown => "unknown",
        }
    }
}

/// Battery power-flow state as reported upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryState {
    Charging,
    Discharging,
    Idle,
    #[default]
    Unknown,
}

impl BatteryState {
    /// Decode the upstream representation: a name or the numeric code
    /// `0 = idle`, `1 = charging`, `2 = discharging`, as string or number
    pub fn from_raw(raw: &serde_json::Value) -> Self {
        match raw {
            serde_json::Value::String(s) => Self::from_label(s),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(0) => Self::Idle,
                Some(1) => Self::Charging,
                Some(2) => Self::Discharging,
                _ => Self::Unknown,
            },
            _ => Self::Unknown,
        }
    }

    /// Case-insensitive; surrounding whitespace is ignored
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "charging" | "1" => Self::Charging,
            "discharging" | "2" => Self::Discharging,
            "idle" | "0" => Self::Idle,
            _ => Self::Unknown,
        }
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Charging => "Charging",
            Self::Discharging => "Discharging",
            Self::Idle => "Idle",
            Self::Unknown => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn none_in_none_out() {
        assert_eq!(estimate_soc(None), None);
        assert_eq!(estimate_soc(Some(f64::NAN)), None);
    }

    #[test]
    fn clamps_at_anchors() {
        assert_eq!(estimate_soc(Some(12.70)), Some(100));
        assert_eq!(estimate_soc(Some(12.80)), Some(100));
        assert_eq!(estimate_soc(Some(13.00)), Some(100));
        assert_eq!(estimate_soc(Some(f64::INFINITY)), Some(100));
        assert_eq!(estimate_soc(Some(10.50)), Some(0));
        assert_eq!(estimate_soc(Some(10.00)), Some(0));
        assert_eq!(estimate_soc(Some(9.50)), Some(0));
        assert_eq!(estimate_soc(Some(-3.0)), Some(0));
    }

    #[test]
    fn exact_anchor_values() {
        assert_eq!(estimate_soc(Some(12.50)), Some(90));
        assert_eq!(estimate_soc(Some(12.06)), Some(50));
        for p in &LEAD_ACID_12V {
            assert_eq!(estimate_soc(Some(p.voltage)), Some(p.soc), "{} V", p.voltage);
        }
    }

    #[test]
    fn interpolates_midpoint() {
        assert_eq!(estimate_soc(Some(12.60)), Some(95));
    }

    #[test]
    fn typical_resting_voltages() {
        let soc = estimate_soc(Some(12.40)).unwrap();
        assert!((70..=80).contains(&soc));
        let soc = estimate_soc(Some(11.50)).unwrap();
        assert!((10..=20).contains(&soc));
    }

    #[test]
    fn rounding_half_goes_up() {
        let curve = DischargeCurve::new(&[point(12.0, 100), point(10.0, 0)]).unwrap();
        assert_eq!(curve.estimate(Some(11.0)), Some(50));
        // 99.5 % rounds to 100
        let coarse = DischargeCurve::new(&[point(2.0, 100), point(1.0, 99), point(0.0, 0)])
            .unwrap();
        assert_eq!(coarse.estimate(Some(1.5)), Some(100));
    }

    #[test]
    fn monotonic_over_reference_curve() {
        let mut prev = 0u8;
        let mut v = 9.0;
        while v <= 13.5 {
            let soc = estimate_soc(Some(v)).unwrap();
            assert!(soc >= prev, "soc dropped from {} to {} at {:.3} V", prev, soc, v);
            prev = soc;
            v += 0.001;
        }
        assert_eq!(prev, 100);
    }

    #[test]
    fn reference_curve_is_valid() {
        assert!(DischargeCurve::new(&LEAD_ACID_12V).is_ok());
        assert_eq!(reference_curve().points().len(), LEAD_ACID_12V.len());
    }

    #[test]
    fn rejects_malformed_curves() {
        assert!(DischargeCurve::new(&[point(12.0, 100)]).is_err());
        assert!(DischargeCurve::new(&[point(12.0, 100), point(12.0, 0)]).is_err());
        assert!(DischargeCurve::new(&[point(11.0, 100), point(12.0, 0)]).is_err());
        assert!(DischargeCurve::new(&[point(12.0, 90), point(11.0, 0)]).is_err());
        assert!(
            DischargeCurve::new(&[point(12.5, 100), point(12.0, 40), point(11.5, 60), point(11.0, 0)])
                .is_err()
        );
        assert!(DischargeCurve::new(&[point(f64::NAN, 100), point(11.0, 0)]).is_err());
        let err = DischargeCurve::new(&[point(12.0, 101), point(11.0, 0)]).unwrap_err();
        assert!(matches!(err, HeliosError::MalformedCurve { .. }));
    }

    #[test]
    fn soc_bands() {
        assert_eq!(SocBand::from_soc(None), SocBand::Unknown);
        assert_eq!(SocBand::from_soc(Some(100)), SocBand::Good);
        assert_eq!(SocBand::from_soc(Some(80)), SocBand::Good);
        assert_eq!(SocBand::from_soc(Some(79)), SocBand::Medium);
        assert_eq!(SocBand::from_soc(Some(50)), SocBand::Medium);
        assert_eq!(SocBand::from_soc(Some(49)), SocBand::Low);
        assert_eq!(SocBand::from_soc(Some(20)), SocBand::Low);
        assert_eq!(SocBand::from_soc(Some(19)), SocBand::Critical);
        assert_eq!(SocBand::from_soc(Some(0)), SocBand::Critical);
        assert_eq!(SocBand::from_soc(Some(101)), SocBand::Unknown);
        assert_eq!(SocBand::from_soc(Some(255)), SocBand::Unknown);
    }

    #[test]
    fn battery_state_labels() {
        for raw in [json!("charging"), json!("1"), json!(1)] {
            assert_eq!(BatteryState::from_raw(&raw).label(), "Charging");
        }
        for raw in [json!("discharging"), json!("2"), json!(2)] {
            assert_eq!(BatteryState::from_raw(&raw).label(), "Discharging");
        }
        for raw in [json!("idle"), json!("0"), json!(0)] {
            assert_eq!(BatteryState::from_raw(&raw).label(), "Idle");
        }
        for raw in [
            json!("unknown"),
            json!(null),
            json!(99),
            json!(1.5),
            json!(true),
            json!(["charging"]),
            json!({}),
        ] {
            assert_eq!(BatteryState::from_raw(&raw), BatteryState::Unknown, "{raw}");
        }
        assert_eq!(BatteryState::from_label(" Charging "), BatteryState::Charging);
        assert_eq!(BatteryState::from_label("DISCHARGING"), BatteryState::Discharging);
    }
}
