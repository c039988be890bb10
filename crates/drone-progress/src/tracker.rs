//! Per-user progress registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use drone_domain::{
    Achievement, AchievementKind, Celebration, LeaderboardEntry, ProgressSnapshot, StatKey,
    UserProgress, UserStats,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::AchievementCatalog;
use crate::engine::AchievementEngine;
use crate::error::{ProgressError, ProgressResult};
use crate::level::LevelCurve;
use crate::stats::{StatEvent, StatsAccumulator};

/// Everything owned for one user, guarded by that user's lock.
#[derive(Debug)]
struct UserRecord {
    stats: StatsAccumulator,
    progress: UserProgress,
}

impl UserRecord {
    fn new(user_id: &str) -> Self {
        Self {
            stats: StatsAccumulator::new(),
            progress: UserProgress::new(user_id),
        }
    }
}

/// Owns every user's stats and progress.
///
/// The registry lock is held only to find or insert a record; all work for
/// one user happens under that user's mutex, so different users never wait
/// on each other and updates for the same user are serialized.
#[derive(Debug)]
pub struct ProgressTracker {
    engine: AchievementEngine,
    users: RwLock<HashMap<String, Arc<Mutex<UserRecord>>>>,
}

impl ProgressTracker {
    pub fn new(catalog: Arc<AchievementCatalog>, curve: LevelCurve) -> Self {
        Self {
            engine: AchievementEngine::new(catalog, curve),
            users: RwLock::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &AchievementEngine {
        &self.engine
    }

    pub fn user_count(&self) -> usize {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn existing(&self, user_id: &str) -> Option<Arc<Mutex<UserRecord>>> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    fn record(&self, user_id: &str) -> Arc<Mutex<UserRecord>> {
        if let Some(record) = self.existing(user_id) {
            return record;
        }
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        users
            .entry(user_id.to_string())
            .or_insert_with(|| {
                debug!(user_id, "Creating progress record");
                Arc::new(Mutex::new(UserRecord::new(user_id)))
            })
            .clone()
    }

    fn lock(record: &Mutex<UserRecord>) -> MutexGuard<'_, UserRecord> {
        record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn award(&self, record: &mut UserRecord) -> Vec<Celebration> {
        let UserRecord { stats, progress } = record;
        let unlocked = self.engine.evaluate(stats.stats(), progress);
        for celebration in &unlocked {
            info!(
                user_id = %progress.user_id,
                achievement = %celebration.achievement.id,
                celebration_id = %celebration.id,
                points = celebration.points_earned,
                total_points = progress.total_points,
                level = progress.level,
                "Achievement unlocked"
            );
        }
        unlocked
    }

    /// Apply a stat event and award anything it unlocks. Returns the
    /// celebrations queued for the new unlocks.
    pub fn apply_event(&self, user_id: &str, event: StatEvent) -> Vec<Celebration> {
        let record = self.record(user_id);
        let mut record = Self::lock(&record);
        record.stats.apply_event(event);
        self.award(&mut record)
    }

    /// Host-reported stat update by name. Rejected updates change nothing.
    pub fn record_stat(
        &self,
        user_id: &str,
        stat_name: &str,
        value: f64,
    ) -> ProgressResult<Vec<Celebration>> {
        let key: StatKey = stat_name
            .parse()
            .map_err(|err: drone_domain::UnknownStat| ProgressError::Validation(err.to_string()))?;
        StatsAccumulator::check(key, value)?;

        let record = self.record(user_id);
        let mut record = Self::lock(&record);
        record.stats.record(key, value)?;
        Ok(self.award(&mut record))
    }

    /// Evaluate the catalog against externally supplied stats.
    pub fn evaluate(&self, user_id: &str, stats: &UserStats) -> Vec<Celebration> {
        let record = self.record(user_id);
        let mut record = Self::lock(&record);
        self.engine.evaluate(stats, &mut record.progress)
    }

    /// Current stats; defaults for unknown users.
    pub fn stats(&self, user_id: &str) -> UserStats {
        self.existing(user_id)
            .map(|record| Self::lock(&record).stats.stats().clone())
            .unwrap_or_default()
    }

    pub fn progress(&self, user_id: &str) -> Option<UserProgress> {
        self.existing(user_id)
            .map(|record| Self::lock(&record).progress.clone())
    }

    /// Remove and return the oldest undelivered celebration.
    pub fn dequeue_celebration(&self, user_id: &str) -> Option<Celebration> {
        let record = self.existing(user_id)?;
        let mut record = Self::lock(&record);
        record.progress.pending_celebrations.pop_front()
    }

    /// Remove a specific pending celebration by id.
    pub fn acknowledge_celebration(
        &self,
        user_id: &str,
        celebration_id: Uuid,
    ) -> ProgressResult<Celebration> {
        let not_found = || {
            ProgressError::NotFound(format!(
                "celebration {celebration_id} is not pending for {user_id}"
            ))
        };
        let record = self.existing(user_id).ok_or_else(not_found)?;
        let mut record = Self::lock(&record);
        let queue = &mut record.progress.pending_celebrations;
        let index = queue
            .iter()
            .position(|c| c.id == celebration_id)
            .ok_or_else(not_found)?;
        queue.remove(index).ok_or_else(not_found)
    }

    /// Pending celebrations, oldest first, without removing them.
    pub fn pending_celebrations(&self, user_id: &str) -> Vec<Celebration> {
        self.existing(user_id)
            .map(|record| {
                Self::lock(&record)
                    .progress
                    .pending_celebrations
                    .iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Read-only dashboard projection. Unknown users get a fresh projection
    /// without a record being created.
    pub fn dashboard(&self, user_id: &str) -> ProgressSnapshot {
        let (stats, progress) = match self.existing(user_id) {
            Some(record) => {
                let record = Self::lock(&record);
                (record.stats.stats().clone(), record.progress.clone())
            }
            None => (UserStats::default(), UserProgress::new(user_id)),
        };

        let curve = self.engine.curve();
        ProgressSnapshot {
            user_id: user_id.to_string(),
            level: progress.level,
            total_points: progress.total_points,
            achievements_earned: progress.earned.len(),
            level_progress: curve.progress_within_level(progress.total_points),
            next_level_points_required: curve.points_to_next_level(progress.total_points),
            earned_ids: progress.earned,
            pending_celebrations: progress.pending_celebrations.into_iter().collect(),
            stats,
        }
    }

    /// Top users by points, then level, then id.
    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let records: Vec<_> = self
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut entries: Vec<LeaderboardEntry> = records
            .iter()
            .map(|record| {
                let record = Self::lock(record);
                let stats = record.stats.stats();
                LeaderboardEntry {
                    rank: 0,
                    user_id: record.progress.user_id.clone(),
                    total_points: record.progress.total_points,
                    level: record.progress.level,
                    achievements_count: record.progress.earned.len(),
                    flights_completed: stats.flights_completed,
                    missions_completed: stats.missions_completed,
                }
            })
            .collect();

        entries.sort_by(|a, b| {
            b.total_points
                .cmp(&a.total_points)
                .then(b.level.cmp(&a.level))
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        entries.truncate(limit);
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.rank = (i + 1) as u32;
        }
        entries
    }

    /// Catalog listing, optionally filtered by kind or to earned entries.
    /// Hidden achievements are listed only once earned.
    pub fn achievements_for(
        &self,
        user_id: &str,
        kind: Option<AchievementKind>,
        earned_only: bool,
    ) -> Vec<Achievement> {
        let earned = self
            .progress(user_id)
            .map(|progress| progress.earned)
            .unwrap_or_default();
        let is_earned = |id: &str| earned.iter().any(|e| e == id);

        self.engine
            .catalog()
            .iter()
            .filter(|a| kind.is_none_or(|k| a.kind == k))
            .filter(|a| !earned_only || is_earned(&a.id))
            .filter(|a| !a.hidden || is_earned(&a.id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::Fake;
    use fake::faker::internet::en::Username;

    fn tracker() -> ProgressTracker {
        ProgressTracker::new(Arc::new(AchievementCatalog::builtin()), LevelCurve::default())
    }

    #[test]
    fn test_flight_events_unlock_first_flight() {
        let tracker = tracker();
        let user: String = Username().fake();

        tracker.apply_event(&user, StatEvent::FlightArmed);
        let unlocked = tracker.apply_event(&user, StatEvent::FlightLanded { duration_s: 90.0 });
        assert_eq!(unlocked.len(), 1);
        assert_eq!(unlocked[0].achievement.id, "first_flight");
        assert_eq!(unlocked[0].user_id, user);

        let dashboard = tracker.dashboard(&user);
        assert_eq!(dashboard.total_points, 50);
        assert_eq!(dashboard.achievements_earned, 1);
        assert!((dashboard.level_progress - 0.5).abs() < 1e-9);
        assert_eq!(dashboard.next_level_points_required, 50);
        assert_eq!(dashboard.stats.safe_flights, 1);
    }

    #[test]
    fn test_dequeue_is_fifo_and_at_most_once() {
        let tracker = tracker();
        let stats = UserStats {
            flights_completed: 50,
            objects_detected: 100,
            ..UserStats::default()
        };
        let unlocked = tracker.evaluate("ops", &stats);
        assert_eq!(unlocked.len(), 3);

        let mut delivered = Vec::new();
        while let Some(celebration) = tracker.dequeue_celebration("ops") {
            delivered.push(celebration.achievement.id);
        }
        let expected: Vec<_> = unlocked.into_iter().map(|c| c.achievement.id).collect();
        assert_eq!(delivered, expected);
        assert!(tracker.dequeue_celebration("ops").is_none());
        assert!(tracker.evaluate("ops", &stats).is_empty());
        assert!(tracker.dequeue_celebration("ops").is_none());
    }

    #[test]
    fn test_acknowledge_specific_celebration() {
        let tracker = tracker();
        tracker.record_stat("ops", "flights_completed", 1.0).unwrap();
        let unlocked = tracker.record_stat("ops", "missions_completed", 1.0).unwrap();
        let pending = tracker.pending_celebrations("ops");
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[1], unlocked[0]);

        let acked = tracker.acknowledge_celebration("ops", unlocked[0].id).unwrap();
        assert_eq!(acked.achievement.id, "mission_rookie");
        assert!(matches!(
            tracker.acknowledge_celebration("ops", unlocked[0].id),
            Err(ProgressError::NotFound(_))
        ));
        assert_eq!(tracker.pending_celebrations("ops").len(), 1);
    }

    #[test]
    fn test_record_stat_rejections_do_not_create_users() {
        let tracker = tracker();
        assert!(matches!(
            tracker.record_stat("ops", "altitude_record", 1.0),
            Err(ProgressError::Validation(_))
        ));
        assert!(matches!(
            tracker.record_stat("ops", "mission_success_rate", 1.0),
            Err(ProgressError::Validation(_))
        ));
        assert!(matches!(
            tracker.record_stat("ops", "flights_completed", -2.0),
            Err(ProgressError::Validation(_))
        ));
        assert_eq!(tracker.user_count(), 0);
    }

    #[test]
    fn test_dashboard_for_unknown_user_is_read_only() {
        let tracker = tracker();
        let dashboard = tracker.dashboard("nobody");
        assert_eq!(dashboard.level, 1);
        assert_eq!(dashboard.total_points, 0);
        assert_eq!(dashboard.next_level_points_required, 100);
        assert_eq!(tracker.user_count(), 0);
    }

    #[test]
    fn test_concurrent_updates_never_double_award() {
        let tracker = tracker();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        tracker.record_stat("shared", "flights_completed", 1.0).unwrap();
                    }
                });
            }
        });

        let progress = tracker.progress("shared").unwrap();
        assert_eq!(tracker.stats("shared").flights_completed, 200);
        let mut earned = progress.earned.clone();
        earned.sort();
        earned.dedup();
        assert_eq!(earned.len(), progress.earned.len());
        assert_eq!(progress.total_points, 50 + 200);
        assert_eq!(progress.pending_celebrations.len(), 2);
    }

    #[test]
    fn test_leaderboard_ordering() {
        let tracker = tracker();
        tracker.record_stat("alice", "flights_completed", 50.0).unwrap();
        tracker.record_stat("bob", "flights_completed", 1.0).unwrap();
        tracker.record_stat("carol", "flights_completed", 1.0).unwrap();
        tracker.record_stat("dave", "night_missions", 1.0).unwrap();

        let board = tracker.leaderboard(3);
        let order: Vec<_> = board.iter().map(|e| (e.rank, e.user_id.as_str())).collect();
        assert_eq!(order, vec![(1, "alice"), (2, "bob"), (3, "carol")]);
        assert_eq!(board[0].total_points, 250);
        assert_eq!(board[0].flights_completed, 50);
    }

    #[test]
    fn test_hidden_achievements_listed_once_earned() {
        let tracker = tracker();
        let all = tracker.achievements_for("ops", None, false);
        assert_eq!(all.len(), 12);
        assert!(all.iter().all(|a| a.id != "legendary_pilot"));

        let missions = tracker.achievements_for("ops", Some(AchievementKind::Mission), false);
        assert_eq!(missions.len(), 3);

        tracker.record_stat("ops", "flights_completed", 1.0).unwrap();
        let earned = tracker.achievements_for("ops", None, true);
        assert_eq!(earned.len(), 1);
    }
}
