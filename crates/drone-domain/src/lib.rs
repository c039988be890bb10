//! # Drone Sortie Core - Domain Model
//!
//! Core domain entities, value objects, and enums for a single surveillance
//! drone and the operators who fly it. These types are the single source of
//! truth across all layers: simulator, progression engine, and runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod progress;

pub use progress::*;

/// Metres per degree of latitude (equirectangular approximation)
pub const METERS_PER_DEG_LAT: f64 = 111_320.0;

// =============================================================================
// VALUE OBJECTS
// =============================================================================

/// Geographic position with altitude above the launch point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    pub alt_m: f64,
}

impl Position {
    pub fn new(lat: f64, lng: f64, alt_m: f64) -> Self {
        Self { lat, lng, alt_m }
    }

    /// Calculate great-circle distance to another point (Haversine formula)
    #[must_use]
    pub fn distance_to_m(&self, other: &Position) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;

        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lng = (other.lng - self.lng).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_M * c
    }

    /// East/north offset in metres from this point to `other`
    #[must_use]
    pub fn offset_to_m(&self, other: &Position) -> (f64, f64) {
        let north = (other.lat - self.lat) * METERS_PER_DEG_LAT;
        let east = (other.lng - self.lng) * METERS_PER_DEG_LAT * self.lat.to_radians().cos();
        (east, north)
    }

    /// Horizontal distance in metres over the local tangent plane
    #[must_use]
    pub fn horizontal_distance_m(&self, other: &Position) -> f64 {
        let (east, north) = self.offset_to_m(other);
        east.hypot(north)
    }

    /// Point displaced by the given east/north metres, at a new altitude
    #[must_use]
    pub fn displaced(&self, east_m: f64, north_m: f64, alt_m: f64) -> Self {
        let cos_lat = self.lat.to_radians().cos().max(1e-6);
        Self {
            lat: self.lat + north_m / METERS_PER_DEG_LAT,
            lng: self.lng + east_m / (METERS_PER_DEG_LAT * cos_lat),
            alt_m,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite() && self.alt_m.is_finite()
    }

    /// Reject non-finite or out-of-range coordinates
    pub fn validate(&self) -> Result<(), CommandError> {
        if !self.is_finite() {
            return Err(CommandError::Validation(
                "coordinates must be finite numbers".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(CommandError::Validation(format!(
                "invalid latitude: {}",
                self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(CommandError::Validation(format!(
                "invalid longitude: {}",
                self.lng
            )));
        }
        Ok(())
    }
}

impl Default for Position {
    fn default() -> Self {
        // Default launch point: Islamabad
        Self {
            lat: 33.6844,
            lng: 73.0479,
            alt_m: 0.0,
        }
    }
}

/// Velocity vector. `vx` east, `vy` north, `vz` up, all m/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub ground_speed: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
}

/// Attitude in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Simulated onboard sensor readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    pub gps_satellites: u32,
    pub temperature_c: f64,
    pub pressure_hpa: f64,
    pub humidity_pct: f64,
}

impl Default for SensorReadings {
    fn default() -> Self {
        Self {
            gps_satellites: 6,
            temperature_c: 25.0,
            pressure_hpa: 1013.25,
            humidity_pct: 50.0,
        }
    }
}

// =============================================================================
// ENUMS
// =============================================================================

/// Flight controller mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightMode {
    #[default]
    Manual,
    Guided,
    Auto,
    Rtl, // Return to Launch
}

/// Action executed on arrival at a waypoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaypointAction {
    #[default]
    Navigate,
    Hover,
    Photo,
    VideoStart,
    VideoStop,
    DetectObjects,
}

/// Mission lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionStatus {
    Running,
    Completed,
    Aborted,
}

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

impl AlertSeverity {
    /// True if this severity is at least as urgent as `min`
    pub fn at_least(self, min: AlertSeverity) -> bool {
        self.urgency() >= min.urgency()
    }

    fn urgency(self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Warning => 1,
            Self::Critical => 2,
        }
    }
}

// =============================================================================
// ENTITY TYPES
// =============================================================================

/// Canonical state of the drone. Snapshots are owned copies of this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneState {
    pub armed: bool,
    pub flying: bool,
    pub mode: FlightMode,
    pub battery_pct: f64,

    pub position: Position,
    pub velocity: Velocity,
    pub attitude: Attitude,
    pub heading_deg: f64,
    pub sensors: SensorReadings,

    /// Seconds airborne in the current flight
    pub flight_time_s: f64,
    /// Launch point, used by return-to-launch and the geofence
    pub home: Position,

    pub timestamp: DateTime<Utc>,
}

impl DroneState {
    /// Disarmed, fully charged drone sitting on the launch point
    pub fn grounded_at(home: Position) -> Self {
        let home = Position { alt_m: 0.0, ..home };
        Self {
            armed: false,
            flying: false,
            mode: FlightMode::Manual,
            battery_pct: 100.0,
            position: home,
            velocity: Velocity::default(),
            attitude: Attitude::default(),
            heading_deg: 0.0,
            sensors: SensorReadings::default(),
            flight_time_s: 0.0,
            home,
            timestamp: Utc::now(),
        }
    }

    /// `flying ⇒ armed` and battery within [0, 100]
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        (!self.flying || self.armed) && (0.0..=100.0).contains(&self.battery_pct)
    }
}

impl Default for DroneState {
    fn default() -> Self {
        Self::grounded_at(Position::default())
    }
}

/// Mission waypoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lng: f64,
    pub alt_m: f64,
    #[serde(default)]
    pub action: WaypointAction,
}

impl Waypoint {
    pub fn new(lat: f64, lng: f64, alt_m: f64, action: WaypointAction) -> Self {
        Self {
            lat,
            lng,
            alt_m,
            action,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.lat, self.lng, self.alt_m)
    }
}

/// Reusable mission plan. Starting a mission copies the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionTemplate {
    pub name: String,
    pub waypoints: Vec<Waypoint>,
}

/// Mission entity - an executing or finished copy of a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: Uuid,
    pub name: String,
    pub waypoints: Vec<Waypoint>,

    // Progress
    pub current_index: usize,
    pub progress_pct: f64,
    pub objects_detected: u32,

    // Lifecycle
    pub active: bool,
    pub status: MissionStatus,
    pub suspended: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub abort_reason: Option<String>,
}

impl Mission {
    /// Start a fresh running mission from a template
    pub fn from_template(template: &MissionTemplate) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: template.name.clone(),
            waypoints: template.waypoints.clone(),
            current_index: 0,
            progress_pct: 0.0,
            objects_detected: 0,
            active: true,
            status: MissionStatus::Running,
            suspended: false,
            started_at: Utc::now(),
            finished_at: None,
            abort_reason: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == MissionStatus::Running
    }

    pub fn current_waypoint(&self) -> Option<&Waypoint> {
        self.waypoints.get(self.current_index)
    }
}

/// Operator-issued flight commands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightCommand {
    Arm,
    Disarm,
    Takeoff { altitude_m: f64 },
    Land,
    Goto { lat: f64, lng: f64, alt_m: f64 },
    ReturnToLaunch,
    EmergencyStop,
}

impl FlightCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arm => "ARM",
            Self::Disarm => "DISARM",
            Self::Takeoff { .. } => "TAKEOFF",
            Self::Land => "LAND",
            Self::Goto { .. } => "GOTO",
            Self::ReturnToLaunch => "RETURN_TO_LAUNCH",
            Self::EmergencyStop => "EMERGENCY_STOP",
        }
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// Discrete events raised by the flight simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightEvent {
    Armed,
    Disarmed,
    TakeoffStarted { target_alt_m: f64 },
    LandingStarted,
    Landed { flight_duration_s: f64 },
    SafetyIncident { reason: String },
    BatteryLow { battery_pct: f64 },
    WaypointReached {
        mission_id: Uuid,
        index: usize,
        action: WaypointAction,
    },
    ObjectsDetected { count: u32, confirmed: u32 },
    MissionCompleted { mission_id: Uuid },
    MissionAborted { mission_id: Uuid, reason: String },
}

/// Operator-facing alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub severity: AlertSeverity,
    pub kind: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(severity: AlertSeverity, kind: &str, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity,
            kind: kind.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Command rejection reasons
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Numeric edge cases corrected in place by the simulator. Logged, never
/// returned to callers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationClamp {
    #[error("battery reading {raw} outside [0, 100]")]
    BatteryOutOfRange { raw: f64 },

    #[error("battery rose from {previous} to {raw} while airborne")]
    BatteryRoseInFlight { previous: f64, raw: f64 },

    #[error("battery changed from {previous} to {raw} while grounded")]
    BatteryChangedOnGround { previous: f64, raw: f64 },

    #[error("altitude {raw} below ground")]
    NegativeAltitude { raw: f64 },

    #[error("non-finite position discarded")]
    NonFinitePosition,

    #[error("flight flag change without touchdown discarded")]
    UnexpectedFlightTransition,
}
