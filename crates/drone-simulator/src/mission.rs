//! Mission execution: waypoint sequencing, progress, and on-arrival actions.

use chrono::Utc;
use drone_domain::{
    CommandError, DroneState, FlightEvent, Mission, MissionStatus, MissionTemplate, Position,
    WaypointAction,
};
use rand_chacha::ChaCha8Rng;

use crate::detection::DetectionSimulator;
use crate::flight::FlightGoal;
use crate::telemetry::has_arrived;

/// Runs at most one mission at a time. Holds the last finished mission
/// until the next one starts.
#[derive(Debug, Default)]
pub struct MissionRunner {
    mission: Option<Mission>,
    /// Where the current leg started, for progress interpolation
    leg_origin: Option<Position>,
    recording: bool,
    scanning: bool,
}

impl MissionRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Mission> {
        self.mission.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.mission.as_ref().is_some_and(Mission::is_running)
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Begin a new mission from `template`, starting the first leg at `origin`.
    /// Waypoint validation against flight limits is the caller's job.
    pub fn start(
        &mut self,
        template: &MissionTemplate,
        origin: Position,
    ) -> Result<Mission, CommandError> {
        if self.is_running() {
            return Err(CommandError::Conflict(
                "a mission is already running".to_string(),
            ));
        }
        if template.waypoints.is_empty() {
            return Err(CommandError::Validation(
                "mission has no waypoints".to_string(),
            ));
        }

        let mission = Mission::from_template(template);
        self.mission = Some(mission.clone());
        self.leg_origin = Some(origin);
        self.recording = false;
        self.scanning = false;
        Ok(mission)
    }

    /// Goal the drone should fly this tick, if a mission is in control.
    pub fn steer(&self) -> Option<FlightGoal> {
        let mission = self.mission.as_ref().filter(|m| m.is_running())?;
        if mission.suspended {
            return Some(FlightGoal::Hold);
        }
        mission
            .current_waypoint()
            .map(|wp| FlightGoal::MoveTo(wp.position()))
    }

    pub fn pause(&mut self) -> Result<Mission, CommandError> {
        let mission = self.running_mut()?;
        if mission.suspended {
            return Err(CommandError::PreconditionFailed(
                "mission is already paused".to_string(),
            ));
        }
        mission.suspended = true;
        Ok(mission.clone())
    }

    pub fn resume(&mut self) -> Result<Mission, CommandError> {
        let mission = self.running_mut()?;
        if !mission.suspended {
            return Err(CommandError::PreconditionFailed(
                "mission is not paused".to_string(),
            ));
        }
        mission.suspended = false;
        Ok(mission.clone())
    }

    /// Abort the running mission. Returns `None` if nothing was running.
    pub fn abort(&mut self, reason: &str, events: &mut Vec<FlightEvent>) -> Option<Mission> {
        let mission = self.mission.as_mut().filter(|m| m.is_running())?;
        mission.status = MissionStatus::Aborted;
        mission.active = false;
        mission.suspended = false;
        mission.finished_at = Some(Utc::now());
        mission.abort_reason = Some(reason.to_string());
        events.push(FlightEvent::MissionAborted {
            mission_id: mission.id,
            reason: reason.to_string(),
        });
        self.recording = false;
        self.scanning = false;
        Some(mission.clone())
    }

    /// Update progress after a physics step and run the action of any
    /// waypoint reached. Returns true if a running mission was stepped.
    pub fn advance(
        &mut self,
        state: &DroneState,
        detector: &DetectionSimulator,
        rng: &mut ChaCha8Rng,
        events: &mut Vec<FlightEvent>,
    ) -> bool {
        let Some(mission) = self.mission.as_mut().filter(|m| m.is_running()) else {
            return false;
        };
        if mission.suspended {
            return true;
        }
        let Some(waypoint) = mission.current_waypoint().copied() else {
            return false;
        };

        let altitude = state.position.alt_m;
        if self.scanning {
            let detection = detector.scan_tick(altitude, rng);
            if !detection.is_empty() {
                mission.objects_detected += detection.count;
                events.push(FlightEvent::ObjectsDetected {
                    count: detection.count,
                    confirmed: detection.confirmed,
                });
            }
        }

        let target = waypoint.position();
        let origin = self.leg_origin.unwrap_or(state.position);
        let mut leg_fraction = leg_fraction(&origin, &state.position, &target);

        if has_arrived(&state.position, &target) {
            match waypoint.action {
                WaypointAction::Photo => {
                    let detection = detector.photo_burst(altitude, rng);
                    mission.objects_detected += detection.count;
                    events.push(FlightEvent::ObjectsDetected {
                        count: detection.count,
                        confirmed: detection.confirmed,
                    });
                }
                WaypointAction::VideoStart => self.recording = true,
                WaypointAction::DetectObjects => self.scanning = true,
                WaypointAction::VideoStop => {
                    self.recording = false;
                    self.scanning = false;
                }
                WaypointAction::Hover | WaypointAction::Navigate => {}
            }
            events.push(FlightEvent::WaypointReached {
                mission_id: mission.id,
                index: mission.current_index,
                action: waypoint.action,
            });

            mission.current_index += 1;
            self.leg_origin = Some(target);
            leg_fraction = 0.0;

            if mission.current_index >= mission.waypoints.len() {
                mission.status = MissionStatus::Completed;
                mission.active = false;
                mission.progress_pct = 100.0;
                mission.finished_at = Some(Utc::now());
                self.recording = false;
                self.scanning = false;
                events.push(FlightEvent::MissionCompleted {
                    mission_id: mission.id,
                });
                return true;
            }
        }

        let total = mission.waypoints.len() as f64;
        let progress = ((mission.current_index as f64 + leg_fraction) / total * 100.0)
            .clamp(0.0, 100.0);
        mission.progress_pct = mission.progress_pct.max(progress);
        true
    }

    fn running_mut(&mut self) -> Result<&mut Mission, CommandError> {
        self.mission
            .as_mut()
            .filter(|m| m.is_running())
            .ok_or_else(|| CommandError::PreconditionFailed("no mission is running".to_string()))
    }
}

/// Fraction of the leg from `origin` to `target` already covered at `position`.
fn leg_fraction(origin: &Position, position: &Position, target: &Position) -> f64 {
    let span = |a: &Position, b: &Position| a.horizontal_distance_m(b).hypot(a.alt_m - b.alt_m);
    let length = span(origin, target);
    if length < f64::EPSILON {
        return 1.0;
    }
    (1.0 - span(position, target) / length).clamp(0.0, 1.0)
}
