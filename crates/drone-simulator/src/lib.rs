//! # Drone Simulator
//!
//! Deterministic flight simulator for a single surveillance drone.
//!
//! ## Features
//!
//! - Command validation against flight limits and a geofence
//! - Bounded-rate flight physics with battery drain and sensor noise
//! - Waypoint missions with on-arrival actions
//! - Simulated object detection and survey pattern generation

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod detection;
pub mod engine;
pub mod flight;
pub mod mission;
pub mod pattern;
pub mod telemetry;

pub use detection::{Detection, DetectionSimulator};
pub use engine::{DroneSimulator, SimConfig, TickOutcome};
pub use flight::{FlightGoal, FlightLimits, FlightStateStore};
pub use mission::MissionRunner;
pub use pattern::PatternGenerator;
pub use telemetry::{LowBatteryPolicy, TelemetryConfig, TelemetryFrame, TelemetrySimulator};
