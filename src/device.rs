//! Simulated devices and their per-device scheduling state.

use core::fmt;
use core::num::NonZeroU64;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

pub const MAX_DEVICES: usize = 64;

// Due time used when `now + interval` is past what `Instant` can hold (about 30 years)
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device id must not be empty")]
    EmptyId,
    #[error("device id '{0}' contains a topic separator or wildcard")]
    InvalidId(String),
    #[error("at least one device is required")]
    NoDevices,
    #[error("too many devices (max {})", MAX_DEVICES)]
    TooManyDevices,
}

/// Lower-cased device identifier, unique within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(raw: &str) -> Result<Self, DeviceError> {
        let id = raw.trim().to_lowercase();
        if id.is_empty() {
            return Err(DeviceError::EmptyId);
        }
        if id.contains(|c: char| matches!(c, '/' | '+' | '#')) {
            return Err(DeviceError::InvalidId(id));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered, de-duplicated set of devices simulated in one run.
pub type DeviceRoster = heapless::Vec<DeviceId, MAX_DEVICES>;

pub fn roster<I, S>(raw_ids: I) -> Result<DeviceRoster, DeviceError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut devices = DeviceRoster::new();
    for raw in raw_ids {
        let id = DeviceId::new(raw.as_ref())?;
        if devices.contains(&id) {
            continue;
        }
        devices.push(id).map_err(|_| DeviceError::TooManyDevices)?;
    }

    if devices.is_empty() {
        return Err(DeviceError::NoDevices);
    }
    Ok(devices)
}

/// Publish interval and next due time for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceScheduleState {
    interval_seconds: NonZeroU64,
    next_due_at: Instant,
}

impl DeviceScheduleState {
    /// New state, due immediately at `now`.
    pub fn new(interval_seconds: NonZeroU64, now: Instant) -> Self {
        Self {
            interval_seconds,
            next_due_at: now,
        }
    }

    pub fn interval_seconds(&self) -> NonZeroU64 {
        self.interval_seconds
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.get())
    }

    pub fn next_due_at(&self) -> Instant {
        self.next_due_at
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due_at
    }

    /// Takes effect from the next reschedule; the pending due time is kept.
    pub fn set_interval(&mut self, interval_seconds: NonZeroU64) {
        self.interval_seconds = interval_seconds;
    }

    /// Reschedule after a publish attempt made at `now`.
    pub fn reschedule(&mut self, now: Instant) {
        let next = now
            .checked_add(self.interval())
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        if next > self.next_due_at {
            self.next_due_at = next;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub published: u64,
    pub publish_failures: u64,
    pub interval_changes: u64,
    pub rejected_commands: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct DeviceSlot {
    pub schedule: DeviceScheduleState,
    pub stats: DeviceStats,
}

/// Shared, individually locked state for one device.
#[derive(Debug, Clone)]
pub struct DeviceCell {
    id: DeviceId,
    slot: Arc<Mutex<DeviceSlot>>,
}

impl DeviceCell {
    pub fn new(id: DeviceId, schedule: DeviceScheduleState) -> Self {
        Self {
            id,
            slot: Arc::new(Mutex::new(DeviceSlot {
                schedule,
                stats: DeviceStats::default(),
            })),
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Locks this device only. A poisoned lock is recovered since the slot
    /// holds plain values that cannot be left half-written.
    pub fn lock(&self) -> MutexGuard<'_, DeviceSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn schedule(&self) -> DeviceScheduleState {
        self.lock().schedule
    }

    pub fn stats(&self) -> DeviceStats {
        self.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap()
    }

    #[test]
    fn test_device_id_is_normalized() {
        assert_eq!(DeviceId::new(" Sensor01 ").unwrap().as_str(), "sensor01");
        assert_eq!(DeviceId::new("   ").unwrap_err(), DeviceError::EmptyId);
        assert!(matches!(DeviceId::new("a/b"), Err(DeviceError::InvalidId(_))));
        assert!(matches!(DeviceId::new("s+"), Err(DeviceError::InvalidId(_))));
        assert!(matches!(DeviceId::new("#"), Err(DeviceError::InvalidId(_))));
    }

    #[test]
    fn test_roster_dedupes_and_keeps_order() {
        let devices = roster(["Sensor02", "sensor01", "SENSOR02"]).unwrap();
        let names: Vec<&str> = devices.iter().map(DeviceId::as_str).collect();
        assert_eq!(names, vec!["sensor02", "sensor01"]);
    }

    #[test]
    fn test_roster_bounds() {
        assert_eq!(roster(Vec::<String>::new()).unwrap_err(), DeviceError::NoDevices);

        let many: Vec<String> = (0..=MAX_DEVICES).map(|i| format!("s{}", i)).collect();
        assert_eq!(roster(&many).unwrap_err(), DeviceError::TooManyDevices);
        assert_eq!(roster(&many[..MAX_DEVICES]).unwrap().len(), MAX_DEVICES);
    }

    #[test]
    fn test_new_state_is_due_immediately() {
        let now = Instant::now();
        let state = DeviceScheduleState::new(secs(10), now);
        assert!(state.is_due(now));
        assert_eq!(state.next_due_at(), now);
    }

    #[test]
    fn test_reschedule_counts_from_now() {
        let start = Instant::now();
        let mut state = DeviceScheduleState::new(secs(10), start);

        let late = start + Duration::from_secs(25);
        state.reschedule(late);
        assert_eq!(state.next_due_at(), late + Duration::from_secs(10));
        assert!(!state.is_due(late + Duration::from_secs(9)));
        assert!(state.is_due(late + Duration::from_secs(10)));
    }

    #[test]
    fn test_interval_change_keeps_pending_due_time() {
        let start = Instant::now();
        let mut state = DeviceScheduleState::new(secs(10), start);
        state.reschedule(start);

        state.set_interval(secs(30));
        assert_eq!(state.next_due_at(), start + Duration::from_secs(10));

        state.reschedule(start + Duration::from_secs(10));
        assert_eq!(state.next_due_at(), start + Duration::from_secs(40));
    }

    #[test]
    fn test_due_time_never_moves_backward() {
        let start = Instant::now();
        let mut state = DeviceScheduleState::new(secs(60), start);
        state.reschedule(start);
        let due = state.next_due_at();

        state.set_interval(secs(1));
        state.reschedule(start);
        assert_eq!(state.next_due_at(), due);
    }

    #[test]
    fn test_reschedule_saturates_huge_interval() {
        let start = Instant::now();
        let mut state = DeviceScheduleState::new(secs(u64::MAX), start);

        state.reschedule(start);
        assert!(state.next_due_at() > start);
        assert!(!state.is_due(start + Duration::from_secs(86_400)));
    }

    #[test]
    fn test_cell_clones_share_state() {
        let cell = DeviceCell::new(
            DeviceId::new("sensor01").unwrap(),
            DeviceScheduleState::new(secs(10), Instant::now()),
        );
        let other = cell.clone();

        other.lock().schedule.set_interval(secs(5));
        assert_eq!(cell.schedule().interval_seconds(), secs(5));
    }
}
