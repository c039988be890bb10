//! Per-user statistics fed by flight events and host-reported stats.

use chrono::Utc;
use drone_domain::{FlightEvent, StatKey, StatKind, UserStats};
use serde::{Deserialize, Serialize};

use crate::error::{ProgressError, ProgressResult};

/// Largest counter increment accepted in one update (2^53, the last
/// integer an f64 holds exactly)
pub const MAX_COUNTER_DELTA: f64 = 9_007_199_254_740_992.0;

/// Discrete events that move operator statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatEvent {
    FlightArmed,
    FlightLanded { duration_s: f64 },
    MissionCompleted { success: bool },
    ObjectsDetected { count: u32, confirmed: u32 },
    SafetyIncident,
}

impl StatEvent {
    /// Map a simulator event to the stat event it implies, if any.
    pub fn from_flight_event(event: &FlightEvent) -> Option<Self> {
        match event {
            FlightEvent::Armed => Some(Self::FlightArmed),
            FlightEvent::Landed { flight_duration_s } => Some(Self::FlightLanded {
                duration_s: *flight_duration_s,
            }),
            FlightEvent::MissionCompleted { .. } => Some(Self::MissionCompleted { success: true }),
            FlightEvent::MissionAborted { .. } => Some(Self::MissionCompleted { success: false }),
            FlightEvent::ObjectsDetected { count, confirmed } => Some(Self::ObjectsDetected {
                count: *count,
                confirmed: *confirmed,
            }),
            FlightEvent::SafetyIncident { .. } => Some(Self::SafetyIncident),
            FlightEvent::Disarmed
            | FlightEvent::TakeoffStarted { .. }
            | FlightEvent::LandingStarted
            | FlightEvent::BatteryLow { .. }
            | FlightEvent::WaypointReached { .. } => None,
        }
    }
}

/// One user's statistics plus the per-flight safety flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsAccumulator {
    stats: UserStats,
    incident_this_flight: bool,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &UserStats {
        &self.stats
    }

    /// Apply an event. Each event touches only its own counters.
    pub fn apply_event(&mut self, event: StatEvent) -> &UserStats {
        let stats = &mut self.stats;
        match event {
            StatEvent::FlightArmed => {
                stats.flights_started += 1;
                self.incident_this_flight = false;
            }
            StatEvent::FlightLanded { duration_s } => {
                stats.flights_completed += 1;
                if duration_s.is_finite() && duration_s > 0.0 {
                    stats.total_flight_time_s += duration_s;
                }
                if !self.incident_this_flight {
                    stats.safe_flights += 1;
                }
            }
            StatEvent::MissionCompleted { success } => {
                stats.missions_attempted += 1;
                if success {
                    stats.missions_completed += 1;
                }
            }
            StatEvent::ObjectsDetected { count, confirmed } => {
                stats.objects_detected += u64::from(count);
                stats.detections_confirmed += u64::from(confirmed.min(count));
            }
            StatEvent::SafetyIncident => {
                stats.safety_incidents += 1;
                self.incident_this_flight = true;
            }
        }
        stats.last_activity = Some(Utc::now());
        &self.stats
    }

    /// Check a host-reported update without applying it.
    pub fn check(key: StatKey, value: f64) -> ProgressResult<()> {
        if !value.is_finite() {
            return Err(ProgressError::Validation(format!(
                "{key} requires a finite value"
            )));
        }
        match key.kind() {
            StatKind::Counter if value < 0.0 || value.fract() != 0.0 => Err(
                ProgressError::Validation(format!("{key} takes a non-negative whole number")),
            ),
            StatKind::Counter if value > MAX_COUNTER_DELTA => Err(ProgressError::Validation(
                format!("{key} increment {value} is too large"),
            )),
            StatKind::Accumulator if value < 0.0 => Err(ProgressError::Validation(format!(
                "{key} cannot decrease"
            ))),
            StatKind::Gauge if !(0.0..=1.0).contains(&value) => Err(ProgressError::Validation(
                format!("{key} must be between 0 and 1"),
            )),
            StatKind::Derived | StatKind::Progress => Err(ProgressError::Validation(format!(
                "{key} is computed and cannot be recorded"
            ))),
            _ => Ok(()),
        }
    }

    /// Add `value` to a counter or accumulator, or assign a gauge.
    pub fn record(&mut self, key: StatKey, value: f64) -> ProgressResult<&UserStats> {
        Self::check(key, value)?;

        let whole = value as u64;
        let add = |current: u64| {
            current
                .checked_add(whole)
                .ok_or_else(|| ProgressError::Validation(format!("{key} would overflow")))
        };

        let stats = &mut self.stats;
        match key {
            StatKey::FlightsStarted => stats.flights_started = add(stats.flights_started)?,
            StatKey::FlightsCompleted => stats.flights_completed = add(stats.flights_completed)?,
            StatKey::MissionsAttempted => stats.missions_attempted = add(stats.missions_attempted)?,
            StatKey::MissionsCompleted => {
                // Completions imply attempts
                let completed = add(stats.missions_completed)?;
                let attempted = add(stats.missions_attempted)?;
                stats.missions_completed = completed;
                stats.missions_attempted = attempted;
            }
            StatKey::NightMissions => stats.night_missions = add(stats.night_missions)?,
            StatKey::ObjectsDetected => stats.objects_detected = add(stats.objects_detected)?,
            StatKey::DetectionsConfirmed => {
                let unconfirmed = stats.objects_detected.saturating_sub(stats.detections_confirmed);
                if whole > unconfirmed {
                    return Err(ProgressError::Validation(format!(
                        "{key} cannot exceed the {unconfirmed} unconfirmed detections"
                    )));
                }
                stats.detections_confirmed += whole;
            }
            StatKey::TotalFlightTimeS => stats.total_flight_time_s += value,
            StatKey::SafeFlights => stats.safe_flights = add(stats.safe_flights)?,
            StatKey::SafetyIncidents => stats.safety_incidents = add(stats.safety_incidents)?,
            StatKey::IncidentFreeDays => {
                stats.incident_free_days = add(stats.incident_free_days)?;
            }
            StatKey::AvgSystemPerformance => stats.avg_system_performance = value,
            StatKey::MissionSuccessRate
            | StatKey::DetectionAccuracy
            | StatKey::Level
            | StatKey::TotalPoints => {
                return Err(ProgressError::Validation(format!(
                    "{key} is computed and cannot be recorded"
                )));
            }
        }
        stats.last_activity = Some(Utc::now());
        Ok(&self.stats)
    }
}
