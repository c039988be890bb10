//! # Drone Sortie Runtime
//!
//! Async wiring around the single-drone simulator and the progression
//! engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   tick    ┌─────────────────────────────────────────┐
//! │    Ticker    │──────────▶│               DroneCore                 │
//! └──────────────┘           │  Mutex<DroneSimulator>  (drone lock)    │
//! ┌──────────────┐ commands  │          │ events                       │
//! │   Callers    │──────────▶│          ▼                              │
//! └──────────────┘  queries  │  ProgressTracker        (user locks)    │
//!                            └─────────────────────────────────────────┘
//!                                       │ broadcast
//!                                       ▼
//!                  telemetry / mission / achievement / alert streams
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod ticker;

pub use config::Config;
pub use context::{ALERT_HISTORY, DroneCore, DroneCoreBuilder};
pub use error::{CoreError, CoreResult};
pub use events::{achievement_stream, alert_stream, mission_stream, telemetry_stream};
pub use ticker::{TickerHandle, spawn_ticker};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
