//! Per-device telemetry scheduling.
//!
//! Each device runs its own polling loop: every tick computes the current
//! reading from the virtual clock and, once the device's due time has passed,
//! publishes it and schedules the next publication `interval` seconds later.
//! Interval commands arriving from the bus update the device's interval under
//! the same per-device lock, and apply from the next reschedule on.

use crate::clock::{hour_of_day, VirtualClock};
use crate::curve::{DiurnalCurve, Reading};
use crate::device::{DeviceCell, DeviceId, DeviceScheduleState, DeviceStats};
use crate::protocol::{parse_interval, Topics};
use crate::transport::{ControlHandler, Publisher, TransportError};
use core::num::NonZeroU64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Not due yet.
    Idle,
    Published(Reading),
    /// Publish failed; the device was still rescheduled.
    PublishFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Applied(NonZeroU64),
    Rejected,
    UnknownDevice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub device: DeviceId,
    pub interval_seconds: u64,
    pub stats: DeviceStats,
}

pub struct TelemetryScheduler {
    clock: VirtualClock,
    curve: DiurnalCurve,
    topics: Topics,
    publisher: Arc<dyn Publisher>,
    devices: BTreeMap<DeviceId, DeviceCell>,
    poll_interval: Duration,
}

impl TelemetryScheduler {
    /// Every device starts with `default_interval` and is due at `start`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: VirtualClock,
        curve: DiurnalCurve,
        topics: Topics,
        publisher: Arc<dyn Publisher>,
        devices: &[DeviceId],
        default_interval: NonZeroU64,
        poll_interval: Duration,
        start: Instant,
    ) -> Self {
        let devices = devices
            .iter()
            .map(|id| {
                let schedule = DeviceScheduleState::new(default_interval, start);
                (id.clone(), DeviceCell::new(id.clone(), schedule))
            })
            .collect();

        Self {
            clock,
            curve,
            topics,
            publisher,
            devices,
            poll_interval,
        }
    }

    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn device(&self, id: &DeviceId) -> Option<&DeviceCell> {
        self.devices.get(id)
    }

    pub fn device_ids(&self) -> impl Iterator<Item = &DeviceId> {
        self.devices.keys()
    }

    /// One evaluation of `device` at wall time `now`.
    pub fn tick<R: Rng>(&self, device: &DeviceCell, now: Instant, rng: &mut R) -> TickOutcome {
        let simulated = self.clock.now(now);
        let reading = self.curve.reading(hour_of_day(simulated), rng);

        let mut slot = device.lock();
        if !slot.schedule.is_due(now) {
            return TickOutcome::Idle;
        }

        let result = self.publish_reading(device.id(), &reading);
        slot.schedule.reschedule(now);

        match result {
            Ok(()) => {
                slot.stats.published += 1;
                info!(
                    "[{} | {}] Published: {}",
                    device.id(),
                    simulated.format("%H:%M:%S"),
                    reading
                );
                TickOutcome::Published(reading)
            }
            Err(e) => {
                slot.stats.publish_failures += 1;
                warn!(device = %device.id(), "Publish failed, skipping this cycle: {}", e);
                TickOutcome::PublishFailed
            }
        }
    }

    /// [`tick`](Self::tick) by device id; `None` for unknown devices.
    pub fn tick_device<R: Rng>(&self, id: &DeviceId, now: Instant, rng: &mut R) -> Option<TickOutcome> {
        self.devices.get(id).map(|device| self.tick(device, now, rng))
    }

    fn publish_reading(&self, id: &DeviceId, reading: &Reading) -> Result<(), TransportError> {
        self.publisher
            .publish(&self.topics.temperature(id), &reading.temperature_payload(), true)?;
        self.publisher
            .publish(&self.topics.humidity(id), &reading.humidity_payload(), true)
    }

    /// Apply an interval command. Malformed payloads leave the interval
    /// unchanged; unknown devices are ignored.
    pub fn apply_control(&self, id: &DeviceId, payload: &[u8]) -> ControlOutcome {
        let Some(device) = self.devices.get(id) else {
            debug!(device = %id, "Ignoring interval command for unknown device");
            return ControlOutcome::UnknownDevice;
        };

        match parse_interval(payload) {
            Ok(interval) => {
                let mut slot = device.lock();
                slot.schedule.set_interval(interval);
                slot.stats.interval_changes += 1;
                info!(device = %id, "Publish interval updated to {} seconds", interval);
                ControlOutcome::Applied(interval)
            }
            Err(e) => {
                device.lock().stats.rejected_commands += 1;
                warn!(device = %id, "Discarding interval command: {}", e);
                ControlOutcome::Rejected
            }
        }
    }

    /// Start one task per device. Tasks stop as soon as `shutdown` changes
    /// or its sender is dropped.
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.devices
            .values()
            .map(|device| {
                let scheduler = Arc::clone(self);
                let device = device.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { scheduler.run_device(device, shutdown).await })
            })
            .collect()
    }

    async fn run_device(&self, device: DeviceCell, mut shutdown: watch::Receiver<bool>) {
        let mut rng = StdRng::from_entropy();
        info!(device = %device.id(), "Device simulation started");

        while !*shutdown.borrow() {
            self.tick(&device, Instant::now(), &mut rng);

            tokio::select! {
                _ = time::sleep(self.poll_interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(device = %device.id(), "Device simulation stopped");
    }

    pub fn snapshot(&self) -> Vec<DeviceStatus> {
        self.devices
            .values()
            .map(|device| {
                let slot = device.lock();
                DeviceStatus {
                    device: device.id().clone(),
                    interval_seconds: slot.schedule.interval_seconds().get(),
                    stats: slot.stats,
                }
            })
            .collect()
    }
}

impl ControlHandler for TelemetryScheduler {
    fn on_control_message(&self, device: &DeviceId, payload: &[u8]) {
        self.apply_control(device, payload);
    }
}
