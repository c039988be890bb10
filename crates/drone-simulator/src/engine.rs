//! Drone-level simulation orchestrating the flight store, physics and missions.

use drone_domain::{
    CommandError, DroneState, FlightCommand, FlightEvent, FlightMode, Mission, MissionTemplate,
    Position,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::detection::DetectionSimulator;
use crate::flight::{FlightGoal, FlightLimits, FlightStateStore};
use crate::mission::MissionRunner;
use crate::telemetry::{LowBatteryPolicy, TelemetryConfig, TelemetrySimulator};

/// Simulator construction parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    /// RNG seed; equal seeds and command sequences give equal trajectories
    pub seed: u64,
    pub home: Position,
    pub limits: FlightLimits,
    pub telemetry: TelemetryConfig,
    /// Mean objects seen in one survey photo
    pub detection_burst_mean: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            home: Position::default(),
            limits: FlightLimits::default(),
            telemetry: TelemetryConfig::default(),
            detection_burst_mean: 3.0,
        }
    }
}

/// Result of a single tick.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub tick: u64,
    pub state: DroneState,
    /// Mission snapshot when a mission was stepped this tick
    pub mission: Option<Mission>,
    pub events: Vec<FlightEvent>,
}

/// Single-drone simulator. Synchronous and deterministic for a given seed;
/// the caller owns scheduling and locking.
#[derive(Debug)]
pub struct DroneSimulator {
    store: FlightStateStore,
    telemetry: TelemetrySimulator,
    missions: MissionRunner,
    detector: DetectionSimulator,
    rng: ChaCha8Rng,
    events: Vec<FlightEvent>,
    ticks: u64,
    warned_this_flight: bool,
    emergency_alerted: bool,
}

impl DroneSimulator {
    pub fn new(config: SimConfig) -> Self {
        Self {
            store: FlightStateStore::new(config.home, config.limits),
            telemetry: TelemetrySimulator::new(config.telemetry),
            missions: MissionRunner::new(),
            detector: DetectionSimulator::with_burst_mean(config.detection_burst_mean),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            events: Vec::new(),
            ticks: 0,
            warned_this_flight: false,
            emergency_alerted: false,
        }
    }

    pub fn snapshot(&self) -> DroneState {
        self.store.snapshot()
    }

    pub fn current_mission(&self) -> Option<Mission> {
        self.missions.current().cloned()
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn goal(&self) -> FlightGoal {
        self.store.goal()
    }

    /// Whether a survey leg is scanning for objects every tick.
    pub fn is_scanning(&self) -> bool {
        self.missions.is_scanning()
    }

    /// Drain events raised by commands since the last drain.
    pub fn take_events(&mut self) -> Vec<FlightEvent> {
        self.collect_store_events();
        std::mem::take(&mut self.events)
    }

    /// Apply an operator command.
    pub fn apply(&mut self, command: FlightCommand) -> Result<DroneState, CommandError> {
        if matches!(command, FlightCommand::Goto { .. }) && self.missions.is_running() {
            return Err(CommandError::Conflict(
                "a mission is in progress; pause or abort it first".to_string(),
            ));
        }

        let state = self.store.apply(command).inspect_err(|err| {
            debug!(command = command.as_str(), error = %err, "Command rejected");
        })?;
        if matches!(command, FlightCommand::Takeoff { .. }) {
            self.warned_this_flight = false;
            self.emergency_alerted = false;
        }
        self.collect_store_events();

        let abort_reason = match command {
            FlightCommand::Land => Some("landing commanded"),
            FlightCommand::ReturnToLaunch => Some("return to launch"),
            FlightCommand::EmergencyStop => Some("emergency stop"),
            _ => None,
        };
        if let Some(reason) = abort_reason {
            self.abort_mission(reason);
        }

        info!(
            command = command.as_str(),
            armed = state.armed,
            flying = state.flying,
            mode = ?state.mode,
            "Command applied"
        );
        Ok(state)
    }

    /// Start a mission from `template`. The drone must be airborne.
    pub fn start_mission(&mut self, template: &MissionTemplate) -> Result<Mission, CommandError> {
        if self.missions.is_running() {
            return Err(CommandError::Conflict(
                "a mission is already running".to_string(),
            ));
        }
        for waypoint in &template.waypoints {
            self.store.validate_target(&waypoint.position())?;
        }
        if !self.store.state().flying {
            return Err(CommandError::PreconditionFailed(
                "drone must be flying to start a mission".to_string(),
            ));
        }
        if self.store.goal() == FlightGoal::Descend {
            return Err(CommandError::PreconditionFailed(
                "drone is landing".to_string(),
            ));
        }

        let mission = self.missions.start(template, self.store.state().position)?;
        self.store.set_mode(FlightMode::Auto);
        info!(
            mission_id = %mission.id,
            name = %mission.name,
            waypoints = mission.waypoints.len(),
            "Mission started"
        );
        Ok(mission)
    }

    pub fn pause_mission(&mut self) -> Result<Mission, CommandError> {
        let mission = self.missions.pause()?;
        info!(mission_id = %mission.id, progress = mission.progress_pct, "Mission paused");
        Ok(mission)
    }

    pub fn resume_mission(&mut self) -> Result<Mission, CommandError> {
        let mission = self.missions.resume()?;
        info!(mission_id = %mission.id, "Mission resumed");
        Ok(mission)
    }

    /// Abort the running mission, if any. The drone hovers where it is.
    pub fn abort_mission(&mut self, reason: &str) -> Option<Mission> {
        let mission = self.missions.abort(reason, &mut self.events)?;
        if self.store.state().mode == FlightMode::Auto {
            self.store.set_mode(FlightMode::Guided);
            self.store.set_goal(FlightGoal::Hold);
        }
        warn!(mission_id = %mission.id, reason, "Mission aborted");
        Some(mission)
    }

    /// Advance the simulation by `dt` seconds.
    pub fn tick(&mut self, dt: f64) -> TickOutcome {
        self.ticks += 1;

        if let Some(goal) = self.missions.steer() {
            self.store.set_goal(goal);
        }

        let frame = self
            .telemetry
            .advance(self.store.state(), self.store.goal(), dt, &mut self.rng);
        let arrived = frame.arrived;

        for clamp in self.store.commit(frame) {
            warn!(tick = self.ticks, %clamp, "Simulation value clamped");
        }
        self.collect_store_events();

        let state = self.store.state();
        if arrived && state.flying && state.mode == FlightMode::Rtl {
            info!(tick = self.ticks, "Arrived at launch point, landing");
            self.store.begin_descent();
        }

        if self.store.state().flying {
            self.handle_battery();
        }

        let stepped = self.missions.advance(
            self.store.state(),
            &self.detector,
            &mut self.rng,
            &mut self.events,
        );
        let state = self.store.state();
        if state.flying && state.mode == FlightMode::Auto && !self.missions.is_running() {
            self.store.set_mode(FlightMode::Guided);
        }

        self.collect_store_events();
        let state = self.store.snapshot();
        debug!(
            tick = self.ticks,
            battery = state.battery_pct,
            alt = state.position.alt_m,
            flying = state.flying,
            scanning = self.missions.is_scanning(),
            "Tick"
        );

        TickOutcome {
            tick: self.ticks,
            state,
            mission: stepped.then(|| self.missions.current().cloned()).flatten(),
            events: std::mem::take(&mut self.events),
        }
    }

    /// Battery rules are checked against the current level on every
    /// airborne tick. An empty battery stops the drone under any policy.
    fn handle_battery(&mut self) {
        let battery_pct = self.store.state().battery_pct;
        let cfg = *self.telemetry.config();

        if battery_pct < cfg.low_battery_warning_pct && !self.warned_this_flight {
            self.warned_this_flight = true;
            self.store.push_event(FlightEvent::BatteryLow { battery_pct });
        }

        if battery_pct <= 0.0 {
            warn!(tick = self.ticks, "Battery depleted in flight");
            self.emergency_stop("battery depleted in flight");
        } else if battery_pct < cfg.emergency_battery_pct {
            match cfg.low_battery_policy {
                LowBatteryPolicy::AutoLand => {
                    if self.store.goal() != FlightGoal::Descend {
                        warn!(battery = battery_pct, "Battery below emergency threshold, landing");
                        self.store.begin_descent();
                        self.abort_mission("low battery");
                    }
                }
                LowBatteryPolicy::EmergencyStop => {
                    warn!(battery = battery_pct, "Battery below emergency threshold, stopping");
                    self.emergency_stop("battery below emergency threshold");
                }
                LowBatteryPolicy::AlertOnly => {
                    if !self.emergency_alerted {
                        self.emergency_alerted = true;
                        warn!(battery = battery_pct, "Battery below emergency threshold");
                        self.store.push_event(FlightEvent::BatteryLow { battery_pct });
                    }
                }
            }
        }
        self.collect_store_events();
    }

    fn emergency_stop(&mut self, reason: &str) {
        self.store.emergency_stop(reason);
        self.collect_store_events();
        self.abort_mission(reason);
    }

    fn collect_store_events(&mut self) {
        self.events.extend(self.store.take_events());
    }
}
