//! # Drone Progress
//!
//! Operator progression: statistics fed by flight events, achievement
//! evaluation over a read-only catalog, and per-user points, levels and
//! celebration queues.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod catalog;
pub mod engine;
pub mod error;
pub mod level;
pub mod stats;
pub mod tracker;

pub use catalog::AchievementCatalog;
pub use engine::{AchievementEngine, MetricsView};
pub use error::{CatalogError, ProgressError, ProgressResult};
pub use level::LevelCurve;
pub use stats::{StatEvent, StatsAccumulator};
pub use tracker::ProgressTracker;
