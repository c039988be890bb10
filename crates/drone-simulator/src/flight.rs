//! Flight state store: the canonical `DroneState` and command application.

use chrono::Utc;
use drone_domain::{
    CommandError, DroneState, FlightCommand, FlightEvent, FlightMode, Position, SimulationClamp,
    Velocity,
};

use crate::telemetry::TelemetryFrame;

/// Command-level flight limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightLimits {
    /// Arming is refused below this charge
    pub arm_min_battery_pct: f64,
    pub min_altitude_m: f64,
    pub max_altitude_m: f64,
    /// Maximum horizontal distance from home for any target
    pub geofence_radius_m: f64,
}

impl Default for FlightLimits {
    fn default() -> Self {
        Self {
            arm_min_battery_pct: 10.0,
            min_altitude_m: 1.0,
            max_altitude_m: 120.0,
            geofence_radius_m: 1000.0,
        }
    }
}

/// What the simulator is currently flying toward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlightGoal {
    /// Hover in place
    Hold,
    MoveTo(Position),
    /// Descend vertically until touchdown
    Descend,
}

/// Holds the canonical drone state. Every mutation goes through `apply`
/// (operator commands) or `commit` (simulator frames).
#[derive(Debug)]
pub struct FlightStateStore {
    state: DroneState,
    goal: FlightGoal,
    limits: FlightLimits,
    events: Vec<FlightEvent>,
}

impl FlightStateStore {
    /// Create a store with a disarmed drone on the launch point.
    pub fn new(home: Position, limits: FlightLimits) -> Self {
        Self {
            state: DroneState::grounded_at(home),
            goal: FlightGoal::Hold,
            limits,
            events: Vec::new(),
        }
    }

    /// Point-in-time copy of the drone state.
    pub fn snapshot(&self) -> DroneState {
        self.state.clone()
    }

    pub fn state(&self) -> &DroneState {
        &self.state
    }

    pub fn goal(&self) -> FlightGoal {
        self.goal
    }

    pub fn limits(&self) -> &FlightLimits {
        &self.limits
    }

    /// Drain events raised since the last call.
    pub fn take_events(&mut self) -> Vec<FlightEvent> {
        std::mem::take(&mut self.events)
    }

    /// Apply an operator command. On error the state is left untouched.
    pub fn apply(&mut self, command: FlightCommand) -> Result<DroneState, CommandError> {
        match command {
            FlightCommand::Arm => self.arm()?,
            FlightCommand::Disarm => self.disarm()?,
            FlightCommand::Takeoff { altitude_m } => self.takeoff(altitude_m)?,
            FlightCommand::Land => self.land()?,
            FlightCommand::Goto { lat, lng, alt_m } => {
                self.goto(Position::new(lat, lng, alt_m))?;
            }
            FlightCommand::ReturnToLaunch => self.return_to_launch()?,
            FlightCommand::EmergencyStop => self.emergency_stop("emergency stop activated"),
        }
        self.state.timestamp = Utc::now();
        Ok(self.snapshot())
    }

    /// Validate a navigation target against coordinate ranges, altitude
    /// limits and the geofence around home.
    pub fn validate_target(&self, target: &Position) -> Result<(), CommandError> {
        target.validate()?;
        self.validate_altitude(target.alt_m)?;

        let distance = self.state.home.horizontal_distance_m(target);
        if distance > self.limits.geofence_radius_m {
            return Err(CommandError::Validation(format!(
                "target {distance:.0}m from home exceeds geofence radius {:.0}m",
                self.limits.geofence_radius_m
            )));
        }
        Ok(())
    }

    fn validate_altitude(&self, altitude_m: f64) -> Result<(), CommandError> {
        let FlightLimits {
            min_altitude_m,
            max_altitude_m,
            ..
        } = self.limits;
        if !altitude_m.is_finite() || !(min_altitude_m..=max_altitude_m).contains(&altitude_m) {
            return Err(CommandError::Validation(format!(
                "altitude must be between {min_altitude_m} and {max_altitude_m} meters"
            )));
        }
        Ok(())
    }

    fn arm(&mut self) -> Result<(), CommandError> {
        if self.state.armed {
            return Err(CommandError::PreconditionFailed(
                "drone is already armed".to_string(),
            ));
        }
        if self.state.battery_pct < self.limits.arm_min_battery_pct {
            return Err(CommandError::PreconditionFailed(format!(
                "battery {:.1}% below arming minimum {:.1}%",
                self.state.battery_pct, self.limits.arm_min_battery_pct
            )));
        }

        self.state.armed = true;
        self.state.mode = FlightMode::Guided;
        self.events.push(FlightEvent::Armed);
        Ok(())
    }

    fn disarm(&mut self) -> Result<(), CommandError> {
        if self.state.flying {
            return Err(CommandError::PreconditionFailed(
                "cannot disarm while flying".to_string(),
            ));
        }
        if self.state.armed {
            self.state.armed = false;
            self.state.mode = FlightMode::Manual;
            self.events.push(FlightEvent::Disarmed);
        }
        Ok(())
    }

    fn takeoff(&mut self, altitude_m: f64) -> Result<(), CommandError> {
        self.validate_altitude(altitude_m)?;
        if !self.state.armed {
            return Err(CommandError::PreconditionFailed(
                "drone must be armed first".to_string(),
            ));
        }
        if self.state.flying {
            return Err(CommandError::PreconditionFailed(
                "drone is already flying".to_string(),
            ));
        }
        if self.state.battery_pct < self.limits.arm_min_battery_pct {
            return Err(CommandError::PreconditionFailed(format!(
                "battery {:.1}% below takeoff minimum {:.1}%",
                self.state.battery_pct, self.limits.arm_min_battery_pct
            )));
        }

        self.state.flying = true;
        self.state.flight_time_s = 0.0;
        self.state.mode = FlightMode::Guided;
        self.goal = FlightGoal::MoveTo(Position {
            alt_m: altitude_m,
            ..self.state.position
        });
        self.events.push(FlightEvent::TakeoffStarted {
            target_alt_m: altitude_m,
        });
        Ok(())
    }

    fn land(&mut self) -> Result<(), CommandError> {
        if !self.state.flying {
            return Err(CommandError::PreconditionFailed(
                "drone is not flying".to_string(),
            ));
        }
        self.begin_descent();
        Ok(())
    }

    fn goto(&mut self, target: Position) -> Result<(), CommandError> {
        self.validate_target(&target)?;
        if !self.state.flying {
            return Err(CommandError::PreconditionFailed(
                "drone must be flying".to_string(),
            ));
        }
        self.ensure_not_landing()?;

        self.state.mode = FlightMode::Guided;
        self.goal = FlightGoal::MoveTo(target);
        Ok(())
    }

    fn return_to_launch(&mut self) -> Result<(), CommandError> {
        if !self.state.flying {
            return Err(CommandError::PreconditionFailed(
                "drone must be flying".to_string(),
            ));
        }
        self.ensure_not_landing()?;

        self.state.mode = FlightMode::Rtl;
        self.goal = FlightGoal::MoveTo(Position {
            alt_m: self.state.position.alt_m,
            ..self.state.home
        });
        Ok(())
    }

    /// A descent, commanded or forced by low battery, runs until touchdown.
    fn ensure_not_landing(&self) -> Result<(), CommandError> {
        if self.goal == FlightGoal::Descend {
            return Err(CommandError::PreconditionFailed(
                "drone is landing".to_string(),
            ));
        }
        Ok(())
    }

    /// Cut motors immediately: no graceful descent.
    pub(crate) fn emergency_stop(&mut self, reason: &str) {
        self.state.flying = false;
        self.state.armed = false;
        self.state.mode = FlightMode::Manual;
        self.state.position.alt_m = 0.0;
        self.state.velocity = Velocity::default();
        self.goal = FlightGoal::Hold;
        self.events.push(FlightEvent::SafetyIncident {
            reason: reason.to_string(),
        });
    }

    /// Switch to a descend goal. No-op unless airborne.
    pub(crate) fn begin_descent(&mut self) {
        if self.state.flying && self.goal != FlightGoal::Descend {
            self.goal = FlightGoal::Descend;
            self.events.push(FlightEvent::LandingStarted);
        }
    }

    pub(crate) fn set_goal(&mut self, goal: FlightGoal) {
        if self.state.flying && self.goal != FlightGoal::Descend {
            self.goal = goal;
        }
    }

    pub(crate) fn set_mode(&mut self, mode: FlightMode) {
        self.state.mode = mode;
    }

    pub(crate) fn push_event(&mut self, event: FlightEvent) {
        self.events.push(event);
    }

    /// Write a simulator frame back in one step, correcting anything that
    /// would break a state invariant. Returns the corrections made.
    pub fn commit(&mut self, frame: TelemetryFrame) -> Vec<SimulationClamp> {
        let prev = &self.state;
        let mut next = frame.state;
        let mut clamps = Vec::new();

        // Arming only changes through commands; flying only clears at touchdown.
        next.armed = prev.armed;
        next.home = prev.home;
        if next.flying != prev.flying {
            let touchdown = prev.flying && frame.touched_down && self.goal == FlightGoal::Descend;
            if !touchdown {
                clamps.push(SimulationClamp::UnexpectedFlightTransition);
                next.flying = prev.flying;
            }
        }

        if !next.battery_pct.is_finite() {
            clamps.push(SimulationClamp::BatteryOutOfRange {
                raw: next.battery_pct,
            });
            next.battery_pct = prev.battery_pct;
        } else if !(0.0..=100.0).contains(&next.battery_pct) {
            clamps.push(SimulationClamp::BatteryOutOfRange {
                raw: next.battery_pct,
            });
            next.battery_pct = next.battery_pct.clamp(0.0, 100.0);
        }

        if prev.flying {
            if next.battery_pct > prev.battery_pct {
                clamps.push(SimulationClamp::BatteryRoseInFlight {
                    previous: prev.battery_pct,
                    raw: next.battery_pct,
                });
                next.battery_pct = prev.battery_pct;
            }
        } else if (next.battery_pct - prev.battery_pct).abs() > f64::EPSILON {
            clamps.push(SimulationClamp::BatteryChangedOnGround {
                previous: prev.battery_pct,
                raw: next.battery_pct,
            });
            next.battery_pct = prev.battery_pct;
        }

        if !next.position.is_finite() {
            clamps.push(SimulationClamp::NonFinitePosition);
            next.position = prev.position;
        }
        if next.position.alt_m < 0.0 {
            clamps.push(SimulationClamp::NegativeAltitude {
                raw: next.position.alt_m,
            });
            next.position.alt_m = 0.0;
        }

        let landed = prev.flying && !next.flying;
        if landed {
            next.velocity = Velocity::default();
            self.goal = FlightGoal::Hold;
            self.events.push(FlightEvent::Landed {
                flight_duration_s: next.flight_time_s,
            });
        }

        self.state = next;
        clamps
    }
}
