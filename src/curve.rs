//! Diurnal temperature/humidity model.
//!
//! Temperature follows a piecewise-linear curve over the hour of day.
//! Humidity is an inverse linear function of the interpolated temperature,
//! and both values get independent uniform jitter before being rounded to
//! one decimal place.

use core::fmt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const HOURS_PER_DAY: f64 = 24.0;

/// Key points of the daily temperature curve as `(hour_of_day, temperature_c)`.
pub const TEMPERATURE_CURVE: &[(f64, f64)] = &[
    (0.0, 14.0),  // Midnight
    (8.0, 18.0),  // Morning
    (12.0, 30.0), // Afternoon peak
    (18.0, 22.0), // Evening
    (24.0, 14.0), // Back to midnight
];

// Minimum temperature -> maximum humidity, maximum temperature -> minimum humidity
const HUMIDITY_AT_MIN_TEMP: (f64, f64) = (14.0, 85.0);
const HUMIDITY_AT_MAX_TEMP: (f64, f64) = (30.0, 40.0);

const TEMPERATURE_JITTER_C: f64 = 0.3;
const HUMIDITY_JITTER_PCT: f64 = 2.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CurveError {
    #[error("curve needs at least two key points, got {0}")]
    TooFewPoints(usize),
    #[error("key point {index} is not finite")]
    NonFinitePoint { index: usize },
    #[error("key point hours must be strictly ascending (at index {index})")]
    UnorderedPoints { index: usize },
    #[error("curve domain [{first}, {last}] does not cover a full day")]
    IncompleteDomain { first: f64, last: f64 },
    #[error("humidity mapping needs two distinct finite temperatures")]
    DegenerateHumidityMapping,
    #[error("jitter amplitudes must be finite and non-negative")]
    InvalidJitter,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveKeyPoint {
    pub hour_of_day: f64,
    pub temperature_c: f64,
}

impl From<(f64, f64)> for CurveKeyPoint {
    fn from((hour_of_day, temperature_c): (f64, f64)) -> Self {
        Self {
            hour_of_day,
            temperature_c,
        }
    }
}

/// Two `(temperature_c, humidity_pct)` reference points defining humidity as
/// a linear function of temperature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HumidityMapping {
    pub low: (f64, f64),
    pub high: (f64, f64),
}

impl HumidityMapping {
    /// Not clamped: temperatures outside the reference range extrapolate, and
    /// the result may leave `[0, 100]`.
    pub fn humidity_for(&self, temperature_c: f64) -> f64 {
        let (min_temp, max_humidity) = self.low;
        let (max_temp, min_humidity) = self.high;

        let temp_progress = (temperature_c - min_temp) / (max_temp - min_temp);
        max_humidity - (max_humidity - min_humidity) * temp_progress
    }
}

impl Default for HumidityMapping {
    fn default() -> Self {
        Self {
            low: HUMIDITY_AT_MIN_TEMP,
            high: HUMIDITY_AT_MAX_TEMP,
        }
    }
}

/// Half-widths of the uniform noise added to each reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Jitter {
    pub temperature_c: f64,
    pub humidity_pct: f64,
}

impl Jitter {
    pub const NONE: Jitter = Jitter {
        temperature_c: 0.0,
        humidity_pct: 0.0,
    };
}

impl Default for Jitter {
    fn default() -> Self {
        Self {
            temperature_c: TEMPERATURE_JITTER_C,
            humidity_pct: HUMIDITY_JITTER_PCT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub temperature_c: f64,
    pub humidity_pct: f64,
}

impl Reading {
    /// Payload published on the temperature topic, e.g. `"18.3"`.
    pub fn temperature_payload(&self) -> String {
        format!("{:.1}", self.temperature_c)
    }

    pub fn humidity_payload(&self) -> String {
        format!("{:.1}", self.humidity_pct)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Temp={:.1}°C, Humidity={:.1}%", self.temperature_c, self.humidity_pct)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiurnalCurve {
    points: Vec<CurveKeyPoint>,
    humidity: HumidityMapping,
    jitter: Jitter,
}

impl DiurnalCurve {
    pub fn new(
        points: Vec<CurveKeyPoint>,
        humidity: HumidityMapping,
        jitter: Jitter,
    ) -> Result<Self, CurveError> {
        if points.len() < 2 {
            return Err(CurveError::TooFewPoints(points.len()));
        }

        for (index, point) in points.iter().enumerate() {
            if !point.hour_of_day.is_finite() || !point.temperature_c.is_finite() {
                return Err(CurveError::NonFinitePoint { index });
            }
            if index > 0 && point.hour_of_day <= points[index - 1].hour_of_day {
                return Err(CurveError::UnorderedPoints { index });
            }
        }

        let first = points[0].hour_of_day;
        let last = points[points.len() - 1].hour_of_day;
        if first > 0.0 || last < HOURS_PER_DAY {
            return Err(CurveError::IncompleteDomain { first, last });
        }

        let (low_temp, low_humidity) = humidity.low;
        let (high_temp, high_humidity) = humidity.high;
        let finite = [low_temp, low_humidity, high_temp, high_humidity]
            .iter()
            .all(|v| v.is_finite());
        if !finite || low_temp == high_temp {
            return Err(CurveError::DegenerateHumidityMapping);
        }

        let jitter_ok = [jitter.temperature_c, jitter.humidity_pct]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0);
        if !jitter_ok {
            return Err(CurveError::InvalidJitter);
        }

        Ok(Self {
            points,
            humidity,
            jitter,
        })
    }

    pub fn points(&self) -> &[CurveKeyPoint] {
        &self.points
    }

    pub fn humidity_mapping(&self) -> HumidityMapping {
        self.humidity
    }

    pub fn jitter(&self) -> Jitter {
        self.jitter
    }

    /// Same curve with different noise amplitudes.
    pub fn with_jitter(mut self, jitter: Jitter) -> Result<Self, CurveError> {
        let points = core::mem::take(&mut self.points);
        Self::new(points, self.humidity, jitter)
    }

    /// Interpolated temperature at `hour_of_day`, clamped to the curve domain.
    pub fn temperature_at(&self, hour_of_day: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        let hour = hour_of_day.clamp(first.hour_of_day, last.hour_of_day);

        // The last key point closes the final segment rather than starting one.
        let (start, end) = self
            .points
            .windows(2)
            .find(|pair| pair[0].hour_of_day <= hour && hour < pair[1].hour_of_day)
            .map_or((self.points[self.points.len() - 2], last), |pair| (pair[0], pair[1]));

        let progress = (hour - start.hour_of_day) / (end.hour_of_day - start.hour_of_day);
        start.temperature_c + progress * (end.temperature_c - start.temperature_c)
    }

    pub fn humidity_for(&self, temperature_c: f64) -> f64 {
        self.humidity.humidity_for(temperature_c)
    }

    /// Noise-free, unrounded reading.
    pub fn baseline(&self, hour_of_day: f64) -> Reading {
        let temperature_c = self.temperature_at(hour_of_day);

        Reading {
            temperature_c,
            humidity_pct: self.humidity_for(temperature_c),
        }
    }

    /// Jittered reading rounded to one decimal place. Humidity derives from
    /// the pre-jitter temperature.
    pub fn reading<R: Rng>(&self, hour_of_day: f64, rng: &mut R) -> Reading {
        let base = self.baseline(hour_of_day);

        Reading {
            temperature_c: round_tenth(base.temperature_c + symmetric(rng, self.jitter.temperature_c)),
            humidity_pct: round_tenth(base.humidity_pct + symmetric(rng, self.jitter.humidity_pct)),
        }
    }
}

impl Default for DiurnalCurve {
    fn default() -> Self {
        Self {
            points: TEMPERATURE_CURVE.iter().copied().map(CurveKeyPoint::from).collect(),
            humidity: HumidityMapping::default(),
            jitter: Jitter::default(),
        }
    }
}

fn symmetric<R: Rng>(rng: &mut R, amplitude: f64) -> f64 {
    if amplitude > 0.0 {
        rng.gen_range(-amplitude..=amplitude)
    } else {
        0.0
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_default_curve_is_valid() {
        let curve = DiurnalCurve::default();
        let rebuilt = DiurnalCurve::new(
            curve.points().to_vec(),
            curve.humidity_mapping(),
            curve.jitter(),
        );
        assert_eq!(rebuilt.unwrap(), curve);
    }

    #[test]
    fn test_key_points_are_hit_exactly() {
        let curve = DiurnalCurve::default();
        for &(hour, temp) in TEMPERATURE_CURVE {
            assert!((curve.temperature_at(hour) - temp).abs() < EPS, "hour {}", hour);
        }
    }

    #[test]
    fn test_interpolates_between_points() {
        let curve = DiurnalCurve::default();
        assert!((curve.temperature_at(4.0) - 16.0).abs() < EPS);
        assert!((curve.temperature_at(10.0) - 24.0).abs() < EPS);
        assert!((curve.temperature_at(15.0) - 26.0).abs() < EPS);
        assert!((curve.temperature_at(21.0) - 18.0).abs() < EPS);
    }

    #[test]
    fn test_upper_boundary_uses_final_segment() {
        let curve = DiurnalCurve::default();
        assert!((curve.temperature_at(24.0) - 14.0).abs() < EPS);
        assert!((curve.temperature_at(0.0) - 14.0).abs() < EPS);
    }

    #[test]
    fn test_out_of_domain_hours_are_clamped() {
        let curve = DiurnalCurve::default();
        assert!((curve.temperature_at(-3.0) - 14.0).abs() < EPS);
        assert!((curve.temperature_at(30.0) - 14.0).abs() < EPS);
    }

    #[test]
    fn test_humidity_reference_points() {
        let curve = DiurnalCurve::default();
        assert!((curve.humidity_for(14.0) - 85.0).abs() < EPS);
        assert!((curve.humidity_for(30.0) - 40.0).abs() < EPS);
        assert!((curve.humidity_for(22.0) - 62.5).abs() < EPS);
    }

    #[test]
    fn test_humidity_is_not_clamped() {
        let curve = DiurnalCurve::default();
        assert!(curve.humidity_for(50.0) < 0.0);
        assert!(curve.humidity_for(-20.0) > 100.0);
    }

    #[test]
    fn test_zero_jitter_reading_is_rounded_baseline() {
        let curve = DiurnalCurve::default().with_jitter(Jitter::NONE).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let reading = curve.reading(13.5, &mut rng);
        assert_eq!(reading.temperature_c, 28.0);
        assert_eq!(reading.humidity_pct, 45.6);
    }

    #[test]
    fn test_payload_formatting() {
        let reading = Reading {
            temperature_c: 14.0,
            humidity_pct: 62.24,
        };
        assert_eq!(reading.temperature_payload(), "14.0");
        assert_eq!(reading.humidity_payload(), "62.2");
    }

    #[test]
    fn test_rejects_invalid_curves() {
        let humidity = HumidityMapping::default();
        let jitter = Jitter::default();

        assert_eq!(
            DiurnalCurve::new(vec![(0.0, 14.0).into()], humidity, jitter).unwrap_err(),
            CurveError::TooFewPoints(1)
        );
        assert_eq!(
            DiurnalCurve::new(
                vec![(0.0, 14.0).into(), (12.0, 20.0).into(), (12.0, 21.0).into(), (24.0, 14.0).into()],
                humidity,
                jitter
            )
            .unwrap_err(),
            CurveError::UnorderedPoints { index: 2 }
        );
        assert!(matches!(
            DiurnalCurve::new(vec![(1.0, 14.0).into(), (24.0, 14.0).into()], humidity, jitter),
            Err(CurveError::IncompleteDomain { .. })
        ));
        assert!(matches!(
            DiurnalCurve::new(vec![(0.0, f64::NAN).into(), (24.0, 14.0).into()], humidity, jitter),
            Err(CurveError::NonFinitePoint { index: 0 })
        ));

        let flat = HumidityMapping {
            low: (20.0, 80.0),
            high: (20.0, 40.0),
        };
        assert_eq!(
            DiurnalCurve::new(vec![(0.0, 14.0).into(), (24.0, 14.0).into()], flat, jitter).unwrap_err(),
            CurveError::DegenerateHumidityMapping
        );

        let negative = Jitter {
            temperature_c: -0.1,
            humidity_pct: 1.0,
        };
        assert_eq!(
            DiurnalCurve::default().with_jitter(negative).unwrap_err(),
            CurveError::InvalidJitter
        );
    }
}
