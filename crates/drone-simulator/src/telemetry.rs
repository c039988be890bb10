//! Telemetry simulation: physics, battery drain and sensor noise.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use drone_domain::{DroneState, Position, Velocity};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::flight::FlightGoal;

/// Horizontal tolerance for reaching a target
pub const ARRIVAL_RADIUS_M: f64 = 1.0;
/// Vertical tolerance for reaching a target
pub const ARRIVAL_ALT_TOLERANCE_M: f64 = 0.5;
/// Altitude at which a descending drone is considered on the ground
pub const TOUCHDOWN_ALT_M: f64 = 0.05;

/// True when `position` is within arrival tolerance of `target`.
pub fn has_arrived(position: &Position, target: &Position) -> bool {
    position.horizontal_distance_m(target) < ARRIVAL_RADIUS_M
        && (position.alt_m - target.alt_m).abs() < ARRIVAL_ALT_TOLERANCE_M
}

/// Wrap an angle into [0, 360).
fn wrap_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// What happens when the battery crosses the emergency threshold in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LowBatteryPolicy {
    #[default]
    AutoLand,
    EmergencyStop,
    AlertOnly,
}

impl LowBatteryPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoLand => "AUTO_LAND",
            Self::EmergencyStop => "EMERGENCY_STOP",
            Self::AlertOnly => "ALERT_ONLY",
        }
    }
}

impl fmt::Display for LowBatteryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LowBatteryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AUTO_LAND" => Ok(Self::AutoLand),
            "EMERGENCY_STOP" => Ok(Self::EmergencyStop),
            "ALERT_ONLY" => Ok(Self::AlertOnly),
            other => Err(format!("unknown low battery policy: {other}")),
        }
    }
}

/// Physics and battery parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryConfig {
    pub max_speed_mps: f64,
    pub max_climb_rate_mps: f64,
    pub max_descent_rate_mps: f64,
    /// Drain while airborne, percent per second
    pub hover_drain_pct_per_s: f64,
    /// Additional drain at full speed, percent per second
    pub speed_drain_pct_per_s: f64,
    pub low_battery_warning_pct: f64,
    pub emergency_battery_pct: f64,
    pub low_battery_policy: LowBatteryPolicy,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_speed_mps: 15.0,
            max_climb_rate_mps: 3.0,
            max_descent_rate_mps: 2.0,
            hover_drain_pct_per_s: 0.05,
            speed_drain_pct_per_s: 0.05,
            low_battery_warning_pct: 20.0,
            emergency_battery_pct: 5.0,
            low_battery_policy: LowBatteryPolicy::AutoLand,
        }
    }
}

/// Proposed next state plus what happened during the step.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryFrame {
    pub state: DroneState,
    /// Reached the ground under a descend goal
    pub touched_down: bool,
    /// Within tolerance of a `MoveTo` target
    pub arrived: bool,
}

impl TelemetryFrame {
    pub fn new(state: DroneState) -> Self {
        Self {
            state,
            touched_down: false,
            arrived: false,
        }
    }
}

/// Stateless physics stepper; randomness comes from the caller's RNG.
#[derive(Debug, Clone)]
pub struct TelemetrySimulator {
    config: TelemetryConfig,
}

impl TelemetrySimulator {
    pub fn new(config: TelemetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Advance `state` by `dt` seconds toward `goal`.
    pub fn advance(
        &self,
        state: &DroneState,
        goal: FlightGoal,
        dt: f64,
        rng: &mut ChaCha8Rng,
    ) -> TelemetryFrame {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        let mut frame = TelemetryFrame::new(state.clone());
        frame.state.timestamp = Utc::now();

        if state.flying {
            self.integrate(state, goal, dt, &mut frame);
            self.drain_battery(state, dt, &mut frame);
        } else {
            frame.state.velocity = Velocity::default();
        }

        self.jitter(&mut frame.state, rng);
        frame
    }

    fn integrate(&self, state: &DroneState, goal: FlightGoal, dt: f64, frame: &mut TelemetryFrame) {
        let cfg = &self.config;
        let current = state.position;
        let target = match goal {
            FlightGoal::Hold => current,
            FlightGoal::MoveTo(target) => target,
            FlightGoal::Descend => Position {
                alt_m: 0.0,
                ..current
            },
        };

        let (east, north) = current.offset_to_m(&target);
        let horizontal = east.hypot(north);
        let max_step = cfg.max_speed_mps * dt;
        let snap_horizontal = horizontal <= max_step;
        let (step_east, step_north) = if snap_horizontal {
            (east, north)
        } else {
            (east * max_step / horizontal, north * max_step / horizontal)
        };

        let climb = target.alt_m - current.alt_m;
        let max_climb = if climb >= 0.0 {
            cfg.max_climb_rate_mps * dt
        } else {
            cfg.max_descent_rate_mps * dt
        };
        let step_up = climb.clamp(-max_climb, max_climb);

        let mut next = current.displaced(step_east, step_north, current.alt_m + step_up);
        if snap_horizontal {
            next.lat = target.lat;
            next.lng = target.lng;
        }
        if climb.abs() <= max_climb {
            next.alt_m = target.alt_m;
        }

        let next_state = &mut frame.state;
        next_state.position = next;
        next_state.flight_time_s = state.flight_time_s + dt;
        next_state.velocity = if dt > 0.0 {
            Velocity {
                ground_speed: step_east.hypot(step_north) / dt,
                vx: step_east / dt,
                vy: step_north / dt,
                vz: step_up / dt,
            }
        } else {
            Velocity::default()
        };
        if step_east.hypot(step_north) > 0.01 {
            next_state.heading_deg = wrap_degrees(step_east.atan2(step_north).to_degrees());
        }

        match goal {
            FlightGoal::MoveTo(target) => frame.arrived = has_arrived(&next, &target),
            FlightGoal::Descend if next.alt_m <= TOUCHDOWN_ALT_M => {
                next_state.position.alt_m = 0.0;
                next_state.flying = false;
                next_state.velocity = Velocity::default();
                frame.touched_down = true;
            }
            _ => {}
        }
    }

    fn drain_battery(&self, state: &DroneState, dt: f64, frame: &mut TelemetryFrame) {
        let cfg = &self.config;
        let speed_fraction = if cfg.max_speed_mps > 0.0 {
            (frame.state.velocity.ground_speed / cfg.max_speed_mps).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let drain = ((cfg.hover_drain_pct_per_s + cfg.speed_drain_pct_per_s * speed_fraction) * dt)
            .max(0.0);

        frame.state.battery_pct = (state.battery_pct - drain).max(0.0);
    }

    /// Bounded Gaussian noise on attitude and sensors.
    fn jitter(&self, state: &mut DroneState, rng: &mut ChaCha8Rng) {
        let mut noise = |sigma: f64| rng.sample::<f64, _>(StandardNormal) * sigma;

        if state.flying {
            state.attitude.roll = noise(3.0).clamp(-15.0, 15.0);
            state.attitude.pitch = noise(2.0).clamp(-15.0, 15.0);
        } else {
            state.attitude.roll = noise(0.2).clamp(-1.0, 1.0);
            state.attitude.pitch = noise(0.2).clamp(-1.0, 1.0);
        }
        state.attitude.yaw = wrap_degrees(state.heading_deg + noise(1.0).clamp(-3.0, 3.0));

        let alt = state.position.alt_m.max(0.0);
        state.sensors.temperature_c = (25.0 - 0.0065 * alt + noise(0.3)).clamp(-40.0, 60.0);
        state.sensors.pressure_hpa =
            (1013.25 * (1.0 - 2.255_77e-5 * alt).powf(5.255_88) + noise(0.2)).clamp(300.0, 1100.0);
        state.sensors.humidity_pct = (state.sensors.humidity_pct + noise(0.5)).clamp(20.0, 80.0);
        state.sensors.gps_satellites = if state.flying {
            rng.gen_range(8..=12)
        } else {
            rng.gen_range(4..=8)
        };
    }
}

impl Default for TelemetrySimulator {
    fn default() -> Self {
        Self::new(TelemetryConfig::default())
    }
}
