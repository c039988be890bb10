//! Achievement evaluation.

use std::sync::Arc;

use drone_domain::{Achievement, Celebration, StatKey, UserProgress, UserStats};

use crate::catalog::AchievementCatalog;
use crate::level::LevelCurve;

/// Immutable view of everything an achievement criterion can reference.
#[derive(Debug, Clone, Copy)]
pub struct MetricsView<'a> {
    pub stats: &'a UserStats,
    pub earned: &'a [String],
    pub total_points: u64,
    pub level: u32,
}

impl<'a> MetricsView<'a> {
    pub fn new(stats: &'a UserStats, progress: &'a UserProgress) -> Self {
        Self {
            stats,
            earned: &progress.earned,
            total_points: progress.total_points,
            level: progress.level,
        }
    }

    pub fn value(&self, key: StatKey) -> f64 {
        match key {
            StatKey::Level => f64::from(self.level),
            StatKey::TotalPoints => self.total_points as f64,
            other => self.stats.value(other).unwrap_or(0.0),
        }
    }

    pub fn has_earned(&self, id: &str) -> bool {
        self.earned.iter().any(|earned| earned == id)
    }

    /// Every criterion holds and every prerequisite is earned.
    pub fn satisfies(&self, achievement: &Achievement) -> bool {
        achievement
            .prerequisites
            .iter()
            .all(|prerequisite| self.has_earned(prerequisite))
            && achievement
                .criteria
                .iter()
                .all(|(&key, &required)| self.value(key) >= required)
    }
}

/// Evaluates the catalog against user metrics.
#[derive(Debug, Clone)]
pub struct AchievementEngine {
    catalog: Arc<AchievementCatalog>,
    curve: LevelCurve,
}

impl AchievementEngine {
    pub fn new(catalog: Arc<AchievementCatalog>, curve: LevelCurve) -> Self {
        Self { catalog, curve }
    }

    pub fn catalog(&self) -> &AchievementCatalog {
        &self.catalog
    }

    pub fn curve(&self) -> &LevelCurve {
        &self.curve
    }

    /// Unearned achievements whose criteria and prerequisites hold, in
    /// catalog order. Pure.
    pub fn candidates(&self, view: &MetricsView<'_>) -> Vec<&Achievement> {
        self.catalog
            .iter()
            .filter(|achievement| !view.has_earned(&achievement.id))
            .filter(|achievement| view.satisfies(achievement))
            .collect()
    }

    /// Award every achievement the user now qualifies for.
    ///
    /// Runs `candidates` to a fixpoint, so unlocks that depend on points or
    /// prerequisites gained in this same call are awarded too. Each unlock
    /// adds its reward, recomputes the level and queues one celebration.
    /// Returns the queued celebrations in unlock order.
    pub fn evaluate(&self, stats: &UserStats, progress: &mut UserProgress) -> Vec<Celebration> {
        let mut unlocked = Vec::new();
        loop {
            let batch: Vec<Achievement> = self
                .candidates(&MetricsView::new(stats, progress))
                .into_iter()
                .cloned()
                .collect();
            if batch.is_empty() {
                break;
            }

            for achievement in batch {
                let celebration = Celebration::new(&progress.user_id, &achievement);
                progress.earned.push(achievement.id);
                progress.total_points += u64::from(achievement.reward_points);
                progress.pending_celebrations.push_back(celebration.clone());
                unlocked.push(celebration);
            }
            progress.level = progress.level.max(self.curve.level_for(progress.total_points));
        }
        unlocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drone_domain::{AchievementKind, AchievementTier};
    use std::collections::{BTreeMap, BTreeSet};

    fn engine() -> AchievementEngine {
        AchievementEngine::new(Arc::new(AchievementCatalog::builtin()), LevelCurve::default())
    }

    fn ids(unlocked: &[Celebration]) -> Vec<&str> {
        unlocked.iter().map(|c| c.achievement.id.as_str()).collect()
    }

    #[test]
    fn test_first_flight_then_veteran() {
        let engine = engine();
        let mut progress = UserProgress::new("pilot");
        let mut stats = UserStats {
            flights_completed: 1,
            ..UserStats::default()
        };

        let unlocked = engine.evaluate(&stats, &mut progress);
        assert_eq!(ids(&unlocked), vec!["first_flight"]);
        assert_eq!(progress.total_points, 50);
        assert_eq!(progress.level, 1);

        stats.flights_completed = 50;
        let unlocked = engine.evaluate(&stats, &mut progress);
        assert_eq!(ids(&unlocked), vec!["flight_veteran"]);
        assert_eq!(progress.total_points, 250);
        assert_eq!(progress.level, 3);
        assert_eq!(progress.earned, vec!["first_flight", "flight_veteran"]);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let engine = engine();
        let mut progress = UserProgress::new("pilot");
        let stats = UserStats {
            flights_completed: 60,
            objects_detected: 150,
            ..UserStats::default()
        };
        assert!(!engine.evaluate(&stats, &mut progress).is_empty());
        let snapshot = progress.clone();
        assert!(engine.evaluate(&stats, &mut progress).is_empty());
        assert_eq!(progress, snapshot);
    }

    #[test]
    fn test_prerequisite_gates_unlock() {
        let base = Achievement {
            id: "scout".to_string(),
            name: "Scout".to_string(),
            description: String::new(),
            kind: AchievementKind::Exploration,
            tier: AchievementTier::Bronze,
            criteria: BTreeMap::from([(StatKey::FlightsCompleted, 5.0)]),
            reward_points: 10,
            icon: String::new(),
            hidden: false,
            prerequisites: BTreeSet::new(),
        };
        // Listed before its prerequisite so catalog order alone cannot satisfy it
        let ranger = Achievement {
            id: "ranger".to_string(),
            criteria: BTreeMap::from([(StatKey::FlightsCompleted, 1.0)]),
            prerequisites: BTreeSet::from(["scout".to_string()]),
            ..base.clone()
        };
        let catalog = AchievementCatalog::new(vec![ranger, base]).unwrap();
        let engine = AchievementEngine::new(Arc::new(catalog), LevelCurve::default());
        let mut progress = UserProgress::new("pilot");

        let stats = UserStats {
            flights_completed: 2,
            ..UserStats::default()
        };
        assert!(engine.evaluate(&stats, &mut progress).is_empty());

        let stats = UserStats {
            flights_completed: 5,
            ..UserStats::default()
        };
        let unlocked = engine.evaluate(&stats, &mut progress);
        assert_eq!(ids(&unlocked), vec!["scout", "ranger"]);
    }

    #[test]
    fn test_points_chain_within_one_call() {
        let engine = engine();
        let mut progress = UserProgress::new("pilot");
        // Enough raw stats to pass 1000 points and level 10 in one update
        let stats = UserStats {
            flights_completed: 200,
            total_flight_time_s: 200_000.0,
            missions_attempted: 25,
            missions_completed: 25,
            objects_detected: 1000,
            detections_confirmed: 950,
            safe_flights: 10,
            incident_free_days: 30,
            avg_system_performance: 0.97,
            night_missions: 10,
            ..UserStats::default()
        };
        let unlocked = engine.evaluate(&stats, &mut progress);
        assert!(ids(&unlocked).contains(&"drone_operator"));
        assert!(!progress.has_earned("legendary_pilot"));
        assert_eq!(progress.pending_celebrations.len(), unlocked.len());
        let order: Vec<_> = progress
            .pending_celebrations
            .iter()
            .map(|c| c.achievement.id.clone())
            .collect();
        assert_eq!(order, progress.earned);
    }

    #[test]
    fn test_returned_celebrations_are_the_queued_ones() {
        let engine = engine();
        let mut progress = UserProgress::new("pilot");
        let stats = UserStats {
            flights_completed: 50,
            ..UserStats::default()
        };
        let unlocked = engine.evaluate(&stats, &mut progress);
        assert_eq!(ids(&unlocked), vec!["first_flight", "flight_veteran"]);
        assert!(unlocked.iter().all(|c| c.user_id == "pilot"));
        assert_eq!(unlocked[1].points_earned, unlocked[1].achievement.reward_points);

        let queued: Vec<_> = progress.pending_celebrations.iter().cloned().collect();
        assert_eq!(queued, unlocked);
    }
}
