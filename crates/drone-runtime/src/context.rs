//! # Drone Core
//!
//! Shared handle over the simulator and progress tracker. Every command,
//! query and tick goes through here.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError};

use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use drone_domain::{
    Achievement, AchievementKind, AchievementUnlocked, Alert, AlertSeverity, Celebration,
    DroneState, FlightCommand, FlightEvent, LeaderboardEntry, Mission, MissionTemplate,
    ProgressSnapshot,
};
use drone_progress::{AchievementCatalog, ProgressTracker, StatEvent};
use drone_simulator::{DroneSimulator, TickOutcome};

use crate::config::Config;
use crate::error::CoreResult;

/// Alerts kept for `recent_alerts`
pub const ALERT_HISTORY: usize = 50;

/// Default broadcast channel capacity
const CHANNEL_CAPACITY: usize = 1024;

/// Runtime handle shared by the ticker, command callers and subscribers
#[derive(Clone)]
pub struct DroneCore {
    /// The one drone. Tokio's mutex is FIFO, so commands apply in arrival order.
    drone: Arc<Mutex<DroneSimulator>>,

    /// Per-user progression
    progress: Arc<ProgressTracker>,

    /// Most recent alerts, oldest first
    alerts: Arc<std::sync::Mutex<VecDeque<Alert>>>,

    /// User credited with simulator events
    operator_id: Arc<str>,

    /// Drone state broadcaster, one per tick
    pub telemetry_tx: broadcast::Sender<DroneState>,

    /// Mission snapshot broadcaster
    pub mission_tx: broadcast::Sender<Mission>,

    /// Achievement unlock broadcaster
    pub achievement_tx: broadcast::Sender<AchievementUnlocked>,

    /// Alert broadcaster
    pub alert_tx: broadcast::Sender<Alert>,
}

impl DroneCore {
    pub fn new(
        simulator: DroneSimulator,
        progress: ProgressTracker,
        operator_id: &str,
        channel_capacity: usize,
    ) -> Self {
        let capacity = channel_capacity.max(1);
        let (telemetry_tx, _) = broadcast::channel(capacity);
        let (mission_tx, _) = broadcast::channel(capacity);
        let (achievement_tx, _) = broadcast::channel(capacity);
        let (alert_tx, _) = broadcast::channel(capacity);

        Self {
            drone: Arc::new(Mutex::new(simulator)),
            progress: Arc::new(progress),
            alerts: Arc::new(std::sync::Mutex::new(VecDeque::with_capacity(ALERT_HISTORY))),
            operator_id: Arc::from(operator_id),
            telemetry_tx,
            mission_tx,
            achievement_tx,
            alert_tx,
        }
    }

    /// Build a core from configuration and an already loaded catalog
    pub fn from_config(config: &Config, catalog: AchievementCatalog) -> Self {
        Self::new(
            DroneSimulator::new(config.sim_config()),
            ProgressTracker::new(Arc::new(catalog), config.level_curve()),
            &config.operator_id,
            config.event_channel_capacity,
        )
    }

    pub fn operator_id(&self) -> &str {
        &self.operator_id
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.progress
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    pub async fn arm(&self) -> CoreResult<DroneState> {
        self.command(FlightCommand::Arm).await
    }

    pub async fn disarm(&self) -> CoreResult<DroneState> {
        self.command(FlightCommand::Disarm).await
    }

    pub async fn takeoff(&self, altitude_m: f64) -> CoreResult<DroneState> {
        self.command(FlightCommand::Takeoff { altitude_m }).await
    }

    pub async fn land(&self) -> CoreResult<DroneState> {
        self.command(FlightCommand::Land).await
    }

    pub async fn goto(&self, lat: f64, lng: f64, alt_m: f64) -> CoreResult<DroneState> {
        self.command(FlightCommand::Goto { lat, lng, alt_m }).await
    }

    pub async fn return_to_launch(&self) -> CoreResult<DroneState> {
        self.command(FlightCommand::ReturnToLaunch).await
    }

    pub async fn emergency_stop(&self) -> CoreResult<DroneState> {
        self.command(FlightCommand::EmergencyStop).await
    }

    /// Apply a flight command. A rejected command leaves the drone untouched.
    pub async fn command(&self, command: FlightCommand) -> CoreResult<DroneState> {
        let mut drone = self.drone.lock().await;
        let state = drone.apply(command)?;
        let events = drone.take_events();
        self.dispatch(&drone, None, &events);
        Ok(state)
    }

    pub async fn start_mission(&self, template: &MissionTemplate) -> CoreResult<Mission> {
        let mut drone = self.drone.lock().await;
        let mission = drone.start_mission(template)?;
        let events = drone.take_events();
        self.dispatch(&drone, None, &events);
        let _ = self.mission_tx.send(mission.clone());
        Ok(mission)
    }

    pub async fn pause_mission(&self) -> CoreResult<Mission> {
        let mut drone = self.drone.lock().await;
        let mission = drone.pause_mission()?;
        let _ = self.mission_tx.send(mission.clone());
        Ok(mission)
    }

    pub async fn resume_mission(&self) -> CoreResult<Mission> {
        let mut drone = self.drone.lock().await;
        let mission = drone.resume_mission()?;
        let _ = self.mission_tx.send(mission.clone());
        Ok(mission)
    }

    /// Abort the running mission. `None` if nothing was running.
    pub async fn abort_mission(&self, reason: &str) -> Option<Mission> {
        let mut drone = self.drone.lock().await;
        let mission = drone.abort_mission(reason)?;
        let events = drone.take_events();
        // The abort event already broadcasts the final mission snapshot
        self.dispatch(&drone, None, &events);
        Some(mission)
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// Advance the simulation by `dt` seconds and fan out everything it
    /// produced. Stats are credited before the drone lock is released.
    pub async fn tick(&self, dt: f64) -> TickOutcome {
        let mut drone = self.drone.lock().await;
        let outcome = drone.tick(dt);
        self.dispatch(&drone, outcome.mission.as_ref(), &outcome.events);
        let _ = self.telemetry_tx.send(outcome.state.clone());
        outcome
    }

    /// Route simulator events to stats, alerts and subscribers. Called with
    /// the drone lock held; takes user locks only.
    fn dispatch(
        &self,
        drone: &DroneSimulator,
        stepped: Option<&Mission>,
        events: &[FlightEvent],
    ) {
        let mut mission_finished = false;

        for event in events {
            debug!(event = ?event, "Flight event");

            if let Some(alert) = alert_for(event) {
                self.raise_alert(alert);
            }
            if matches!(
                event,
                FlightEvent::MissionCompleted { .. } | FlightEvent::MissionAborted { .. }
            ) {
                mission_finished = true;
            }

            if let Some(stat_event) = StatEvent::from_flight_event(event) {
                let unlocked = self.progress.apply_event(&self.operator_id, stat_event);
                self.announce(&self.operator_id, &unlocked);
            }
        }

        let snapshot = match stepped {
            Some(mission) => Some(mission.clone()),
            None if mission_finished => drone.current_mission(),
            None => None,
        };
        if let Some(mission) = snapshot {
            let _ = self.mission_tx.send(mission);
        }
    }

    /// Broadcast the celebrations queued for fresh unlocks.
    fn announce(&self, user_id: &str, unlocked: &[Celebration]) {
        for celebration in unlocked {
            self.raise_alert(Alert::new(
                AlertSeverity::Info,
                "ACHIEVEMENT_UNLOCKED",
                format!("{user_id} unlocked {}", celebration.achievement.name),
            ));
            let _ = self.achievement_tx.send(AchievementUnlocked {
                user_id: user_id.to_string(),
                celebration: celebration.clone(),
            });
        }
    }

    fn raise_alert(&self, alert: Alert) {
        match alert.severity {
            AlertSeverity::Critical => {
                warn!(kind = %alert.kind, message = %alert.message, "Critical alert");
            }
            _ => info!(kind = %alert.kind, message = %alert.message, "Alert raised"),
        }
        {
            let mut alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
            if alerts.len() == ALERT_HISTORY {
                alerts.pop_front();
            }
            alerts.push_back(alert.clone());
        }
        let _ = self.alert_tx.send(alert);
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub async fn current_state(&self) -> DroneState {
        self.drone.lock().await.snapshot()
    }

    /// Running mission, or the last finished one
    pub async fn current_mission(&self) -> Option<Mission> {
        self.drone.lock().await.current_mission()
    }

    pub async fn tick_count(&self) -> u64 {
        self.drone.lock().await.tick_count()
    }

    pub fn dashboard(&self, user_id: &str) -> ProgressSnapshot {
        self.progress.dashboard(user_id)
    }

    pub fn pending_celebrations(&self, user_id: &str) -> Vec<Celebration> {
        self.progress.pending_celebrations(user_id)
    }

    pub fn dequeue_celebration(&self, user_id: &str) -> Option<Celebration> {
        self.progress.dequeue_celebration(user_id)
    }

    pub fn acknowledge_celebration(
        &self,
        user_id: &str,
        celebration_id: Uuid,
    ) -> CoreResult<Celebration> {
        Ok(self
            .progress
            .acknowledge_celebration(user_id, celebration_id)?)
    }

    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        self.progress.leaderboard(limit)
    }

    /// Catalog entries visible to `user_id`, optionally filtered by kind
    pub fn achievements(&self, user_id: &str, kind: Option<AchievementKind>) -> Vec<Achievement> {
        self.progress.achievements_for(user_id, kind, false)
    }

    /// Achievements `user_id` has earned, in catalog order
    pub fn earned_achievements(&self, user_id: &str) -> Vec<Achievement> {
        self.progress.achievements_for(user_id, None, true)
    }

    /// Up to `limit` alerts, newest first
    pub fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    // =========================================================================
    // STAT INGESTION
    // =========================================================================

    /// Host-reported stat update. Returns the celebrations for what it
    /// unlocked.
    pub fn record_stat(
        &self,
        user_id: &str,
        stat_name: &str,
        value: f64,
    ) -> CoreResult<Vec<Celebration>> {
        let unlocked = self.progress.record_stat(user_id, stat_name, value)?;
        self.announce(user_id, &unlocked);
        Ok(unlocked)
    }
}

/// Operator-facing alert implied by a flight event, if any.
fn alert_for(event: &FlightEvent) -> Option<Alert> {
    let alert = match event {
        FlightEvent::BatteryLow { battery_pct } => Alert::new(
            AlertSeverity::Warning,
            "BATTERY_LOW",
            format!("Battery at {battery_pct:.1}%"),
        ),
        FlightEvent::SafetyIncident { reason } => {
            Alert::new(AlertSeverity::Critical, "SAFETY_INCIDENT", reason.clone())
        }
        FlightEvent::MissionAborted { mission_id, reason } => Alert::new(
            AlertSeverity::Warning,
            "MISSION_ABORTED",
            format!("Mission {mission_id} aborted: {reason}"),
        ),
        FlightEvent::MissionCompleted { mission_id } => Alert::new(
            AlertSeverity::Info,
            "MISSION_COMPLETED",
            format!("Mission {mission_id} completed"),
        ),
        _ => return None,
    };
    Some(alert)
}

/// Builder for DroneCore
pub struct DroneCoreBuilder {
    simulator: Option<DroneSimulator>,
    progress: Option<ProgressTracker>,
    operator_id: String,
    channel_capacity: usize,
}

impl DroneCoreBuilder {
    pub fn new() -> Self {
        Self {
            simulator: None,
            progress: None,
            operator_id: "operator".to_string(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }

    pub fn with_simulator(mut self, simulator: DroneSimulator) -> Self {
        self.simulator = Some(simulator);
        self
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_operator(mut self, operator_id: impl Into<String>) -> Self {
        self.operator_id = operator_id.into();
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<DroneCore, &'static str> {
        let simulator = self.simulator.ok_or("drone simulator required")?;
        let progress = self.progress.ok_or("progress tracker required")?;
        if self.operator_id.trim().is_empty() {
            return Err("operator id required");
        }
        Ok(DroneCore::new(
            simulator,
            progress,
            &self.operator_id,
            self.channel_capacity,
        ))
    }
}

impl Default for DroneCoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drone_domain::{MissionStatus, Position, Waypoint, WaypointAction};
    use drone_progress::LevelCurve;
    use drone_simulator::SimConfig;
    use fake::Fake;
    use fake::faker::internet::en::Username;

    fn core() -> DroneCore {
        DroneCoreBuilder::new()
            .with_simulator(DroneSimulator::new(SimConfig::default()))
            .with_progress(ProgressTracker::new(
                Arc::new(AchievementCatalog::builtin()),
                LevelCurve::default(),
            ))
            .with_operator("pilot")
            .build()
            .unwrap()
    }

    async fn airborne(core: &DroneCore) {
        tokio_test::assert_ok!(core.arm().await);
        tokio_test::assert_ok!(core.takeoff(20.0).await);
        for _ in 0..30 {
            core.tick(1.0).await;
        }
    }

    fn three_waypoints() -> MissionTemplate {
        let home = Position::default();
        let waypoints = [(30.0, 0.0), (30.0, 30.0), (0.0, 30.0)]
            .iter()
            .map(|&(east, north)| {
                let p = home.displaced(east, north, 20.0);
                Waypoint::new(p.lat, p.lng, p.alt_m, WaypointAction::Photo)
            })
            .collect();
        MissionTemplate {
            name: "triangle".to_string(),
            waypoints,
        }
    }

    #[test]
    fn test_builder_requires_parts() {
        assert!(DroneCoreBuilder::new().build().is_err());
        let missing_progress = DroneCoreBuilder::new()
            .with_simulator(DroneSimulator::new(SimConfig::default()))
            .build();
        assert!(missing_progress.is_err());
    }

    #[tokio::test]
    async fn test_takeoff_while_disarmed_is_rejected() {
        let core = core();
        let before = core.current_state().await;

        let err = core.takeoff(20.0).await.unwrap_err();
        assert_eq!(err.error_code(), "PRECONDITION_FAILED");

        let after = core.current_state().await;
        assert_eq!(after.armed, before.armed);
        assert_eq!(after.flying, before.flying);
        assert_eq!(after.position, before.position);
        assert_eq!(after.battery_pct, before.battery_pct);
    }

    #[tokio::test]
    async fn test_mission_completes_and_credits_operator() {
        let core = core();
        airborne(&core).await;

        let mission = core.start_mission(&three_waypoints()).await.unwrap();
        assert!(mission.is_running());

        for _ in 0..200 {
            core.tick(1.0).await;
            if core.current_mission().await.is_some_and(|m| !m.is_running()) {
                break;
            }
        }

        let mission = core.current_mission().await.unwrap();
        assert_eq!(mission.status, MissionStatus::Completed);
        assert_eq!(mission.progress_pct, 100.0);

        let dashboard = core.dashboard("pilot");
        assert_eq!(dashboard.stats.missions_completed, 1);
        assert!(dashboard.earned_ids.iter().any(|id| id == "mission_rookie"));
        assert!(
            core.recent_alerts(ALERT_HISTORY)
                .iter()
                .any(|a| a.kind == "MISSION_COMPLETED")
        );
    }

    #[tokio::test]
    async fn test_emergency_stop_aborts_mission() {
        let core = core();
        airborne(&core).await;
        core.start_mission(&three_waypoints()).await.unwrap();
        core.tick(1.0).await;

        let state = core.emergency_stop().await.unwrap();
        assert!(!state.armed);
        assert!(!state.flying);

        let mission = core.current_mission().await.unwrap();
        assert_eq!(mission.status, MissionStatus::Aborted);
        assert!(!mission.active);
        assert_eq!(core.dashboard("pilot").stats.safety_incidents, 1);

        let alerts = core.recent_alerts(10);
        assert!(alerts.iter().any(|a| a.severity == AlertSeverity::Critical));
        assert!(alerts.iter().any(|a| a.kind == "MISSION_ABORTED"));
    }

    #[tokio::test]
    async fn test_goto_during_mission_conflicts() {
        let core = core();
        airborne(&core).await;
        core.start_mission(&three_waypoints()).await.unwrap();

        let home = Position::default();
        let err = core.goto(home.lat, home.lng, 20.0).await.unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");
    }

    #[tokio::test]
    async fn test_first_flight_unlocks_and_broadcasts() {
        let core = core();
        let mut unlocks = core.achievement_tx.subscribe();

        airborne(&core).await;
        core.land().await.unwrap();
        for _ in 0..30 {
            core.tick(1.0).await;
        }
        assert!(!core.current_state().await.flying);

        let unlocked = unlocks.try_recv().unwrap();
        assert_eq!(unlocked.user_id, "pilot");
        assert_eq!(unlocked.celebration.achievement.id, "first_flight");

        let pending = core.pending_celebrations("pilot");
        assert_eq!(pending[0].id, unlocked.celebration.id);
        let acked = core
            .acknowledge_celebration("pilot", unlocked.celebration.id)
            .unwrap();
        assert_eq!(acked.achievement.id, "first_flight");
    }

    #[tokio::test]
    async fn test_broadcast_matches_celebration_dequeued_first() {
        let core = core();
        let mut unlocks = core.achievement_tx.subscribe();

        let returned = core.record_stat("pilot", "missions_completed", 1.0).unwrap();
        // Another client drains the queue before this subscriber reads
        let dequeued = core.dequeue_celebration("pilot").unwrap();
        assert!(core.pending_celebrations("pilot").is_empty());

        let broadcast = unlocks.try_recv().unwrap();
        assert_eq!(broadcast.celebration, dequeued);
        assert_eq!(returned, vec![dequeued]);
        assert!(unlocks.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_record_stat_validation() {
        let core = core();
        let user: String = Username().fake();

        let err = core.record_stat(&user, "barrel_rolls", 1.0).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        let err = core.record_stat(&user, "flights_completed", -1.0).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(core.leaderboard(10).is_empty());

        let unlocked = core.record_stat(&user, "flights_completed", 1.0).unwrap();
        assert_eq!(unlocked[0].achievement.id, "first_flight");
        assert_eq!(core.leaderboard(10)[0].user_id, user);

        let err = core.acknowledge_celebration(&user, Uuid::new_v4()).unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_alert_history_is_bounded() {
        let core = core();
        for i in 0..(ALERT_HISTORY + 5) {
            core.raise_alert(Alert::new(AlertSeverity::Info, "TEST", format!("alert {i}")));
        }
        let alerts = core.recent_alerts(usize::MAX);
        assert_eq!(alerts.len(), ALERT_HISTORY);
        assert_eq!(alerts[0].message, format!("alert {}", ALERT_HISTORY + 4));
    }

    #[tokio::test]
    async fn test_hidden_achievements_not_listed() {
        let core = core();
        let listed = core.achievements("pilot", None);
        assert!(listed.iter().all(|a| a.id != "legendary_pilot"));
        let missions = core.achievements("pilot", Some(AchievementKind::Mission));
        assert!(missions.iter().all(|a| a.kind == AchievementKind::Mission));
        assert!(core.earned_achievements("pilot").is_empty());
    }
}
