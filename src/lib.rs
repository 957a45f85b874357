//! # SenseClima Simulator
//!
//! Simulated SenseClima environmental sensors publishing temperature and
//! humidity telemetry over MQTT, driven by an accelerated virtual clock.
//!
//! ## Features
//!
//! - **Time-scaled simulation**: a virtual clock runs the day at a configurable
//!   speed (3600x by default, one simulated hour per real second)
//! - **Diurnal readings**: piecewise-linear temperature curve with inverse
//!   humidity and bounded random jitter
//! - **Independent devices**: one scheduling task per device, each with its
//!   own lock-protected publish interval
//! - **Runtime reconfiguration**: interval commands on
//!   `hana/{environment}/senseclima/{device}/interval`
//!
//! ## Quick Start
//!
//! ```rust
//! use senseclima::curve::DiurnalCurve;
//! use rand::SeedableRng;
//!
//! let curve = DiurnalCurve::default();
//! let mut rng = rand::rngs::StdRng::seed_from_u64(42);
//!
//! // 13:30 simulated time
//! let reading = curve.reading(13.5, &mut rng);
//! assert!(reading.temperature_c > 27.0 && reading.temperature_c < 29.0);
//! ```
//!
//! ## Architecture
//!
//! - [`clock`] - Virtual clock mapping wall time to simulated time
//! - [`curve`] - Diurnal temperature/humidity model
//! - [`device`] - Device ids and per-device schedule state
//! - [`scheduler`] - Per-device publish loops and interval commands
//! - [`protocol`] - Topic layout and command payloads
//! - [`transport`] - Publisher/handler seams and the MQTT transport
//! - [`config`] - Tunable defaults and JSON configuration

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod clock;
pub mod config;
pub mod curve;
pub mod device;
pub mod protocol;
pub mod scheduler;
pub mod transport;

// Re-export main public types for convenience
pub use clock::VirtualClock;
pub use config::SimulationConfig;
pub use curve::{DiurnalCurve, Reading};
pub use device::{DeviceId, DeviceScheduleState};
pub use scheduler::TelemetryScheduler;
pub use transport::{ControlHandler, MqttTransport, Publisher};
