//! Accelerated simulation clock.
//!
//! A [`VirtualClock`] maps elapsed wall time onto a simulated calendar that
//! runs `speed_factor` times faster. With the default factor of 3600 one real
//! second advances the simulated day by one hour, so a full diurnal cycle
//! plays out in 24 seconds.

use chrono::{Duration, Local, NaiveDateTime, NaiveTime, Timelike};
use thiserror::Error;
use tokio::time::Instant;

// Caps the simulated offset well inside chrono's representable range.
const MAX_OFFSET_MILLIS: f64 = 1.0e15;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClockError {
    #[error("speed factor must be finite and positive, got {0}")]
    InvalidSpeedFactor(f64),
    #[error("invalid simulated start of day {hour:02}:{minute:02}")]
    InvalidStartOfDay { hour: u32, minute: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct VirtualClock {
    speed_factor: f64,
    simulated_epoch: NaiveDateTime,
    real_epoch: Instant,
}

impl VirtualClock {
    pub fn new(
        speed_factor: f64,
        simulated_epoch: NaiveDateTime,
        real_epoch: Instant,
    ) -> Result<Self, ClockError> {
        if !speed_factor.is_finite() || speed_factor <= 0.0 {
            return Err(ClockError::InvalidSpeedFactor(speed_factor));
        }

        Ok(Self {
            speed_factor,
            simulated_epoch,
            real_epoch,
        })
    }

    /// Clock whose simulated epoch is today's local date at `hour:minute`,
    /// anchored to the current instant.
    pub fn starting_today(speed_factor: f64, hour: u32, minute: u32) -> Result<Self, ClockError> {
        let start = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or(ClockError::InvalidStartOfDay { hour, minute })?;
        let simulated_epoch = Local::now().date_naive().and_time(start);

        Self::new(speed_factor, simulated_epoch, Instant::now())
    }

    pub fn speed_factor(&self) -> f64 {
        self.speed_factor
    }

    pub fn simulated_epoch(&self) -> NaiveDateTime {
        self.simulated_epoch
    }

    pub fn real_epoch(&self) -> Instant {
        self.real_epoch
    }

    /// Simulated timestamp for the wall-clock instant `real`.
    ///
    /// Instants before the real epoch map to the simulated epoch. The offset is
    /// capped at `MAX_OFFSET_MILLIS` (about 31,700 simulated years), and a sum
    /// that still overflows chrono falls back to [`NaiveDateTime::MAX`].
    pub fn now(&self, real: Instant) -> NaiveDateTime {
        let elapsed = real.saturating_duration_since(self.real_epoch);
        let offset_millis = (elapsed.as_secs_f64() * self.speed_factor * 1000.0).min(MAX_OFFSET_MILLIS);

        self.simulated_epoch
            .checked_add_signed(Duration::milliseconds(offset_millis as i64))
            .unwrap_or(NaiveDateTime::MAX)
    }

    /// Simulated time at the current instant.
    pub fn current(&self) -> NaiveDateTime {
        self.now(Instant::now())
    }
}

/// Continuous hour of day in `[0, 24)` from the local wall-clock fields of
/// `simulated`, e.g. 13:30 becomes `13.5`.
pub fn hour_of_day(simulated: NaiveDateTime) -> f64 {
    let seconds = f64::from(simulated.num_seconds_from_midnight());
    let fraction = f64::from(simulated.nanosecond() % 1_000_000_000) / 1.0e9;

    (seconds + fraction) / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::time::Duration as StdDuration;

    fn epoch() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(7, 0, 0))
            .unwrap()
    }

    #[test]
    fn test_rejects_non_positive_speed() {
        let real = Instant::now();
        assert_eq!(
            VirtualClock::new(0.0, epoch(), real).unwrap_err(),
            ClockError::InvalidSpeedFactor(0.0)
        );
        assert!(VirtualClock::new(-2.0, epoch(), real).is_err());
        assert!(VirtualClock::new(f64::NAN, epoch(), real).is_err());
        assert!(VirtualClock::new(f64::INFINITY, epoch(), real).is_err());
    }

    #[test]
    fn test_one_real_second_is_one_simulated_hour() {
        let real = Instant::now();
        let clock = VirtualClock::new(3600.0, epoch(), real).unwrap();

        let later = clock.now(real + StdDuration::from_secs(1));
        assert_eq!(later - epoch(), Duration::hours(1));

        let day = clock.now(real + StdDuration::from_secs(24));
        assert_eq!(day - epoch(), Duration::days(1));
    }

    #[test]
    fn test_now_is_monotonic_and_scaled() {
        let real = Instant::now();
        let clock = VirtualClock::new(60.0, epoch(), real).unwrap();

        let mut previous = clock.now(real);
        for step in 1..50u64 {
            let at = real + StdDuration::from_millis(step * 137);
            let current = clock.now(at);
            assert!(current >= previous);
            previous = current;
        }

        let a = clock.now(real + StdDuration::from_secs(3));
        let b = clock.now(real + StdDuration::from_secs(8));
        assert_eq!(b - a, Duration::seconds(5 * 60));
    }

    #[test]
    fn test_instant_before_epoch_maps_to_epoch() {
        let real = Instant::now() + StdDuration::from_secs(10);
        let clock = VirtualClock::new(3600.0, epoch(), real).unwrap();

        assert_eq!(clock.now(real - StdDuration::from_secs(5)), epoch());
    }

    #[test]
    fn test_huge_elapsed_time_saturates() {
        let real = Instant::now();
        let clock = VirtualClock::new(1.0e12, epoch(), real).unwrap();

        let far = clock.now(real + StdDuration::from_secs(10_000_000));
        assert!(far >= epoch());
    }

    #[test]
    fn test_hour_of_day_is_continuous() {
        let at = |h, m, s| {
            NaiveDate::from_ymd_opt(2024, 3, 1)
                .and_then(|d| d.and_hms_opt(h, m, s))
                .unwrap()
        };

        assert_eq!(hour_of_day(at(0, 0, 0)), 0.0);
        assert_eq!(hour_of_day(at(13, 30, 0)), 13.5);
        assert!((hour_of_day(at(7, 0, 36)) - 7.01).abs() < 1e-9);

        let late = hour_of_day(at(23, 59, 59));
        assert!(late < 24.0 && late > 23.99);
    }

    #[test]
    fn test_starting_today_validates_time() {
        assert!(VirtualClock::starting_today(3600.0, 7, 0).is_ok());
        assert_eq!(
            VirtualClock::starting_today(3600.0, 24, 0).unwrap_err(),
            ClockError::InvalidStartOfDay { hour: 24, minute: 0 }
        );
    }
}
