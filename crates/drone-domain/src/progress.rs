//! Progression types: operator statistics, achievements, celebrations.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// ENUMS
// =============================================================================

/// Achievement categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchievementKind {
    Flight,
    Mission,
    Detection,
    Exploration,
    System,
    Safety,
    Performance,
    Milestone,
}

/// Achievement difficulty tiers, ordered Bronze < ... < Legendary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchievementTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Legendary,
}

/// How a stat may be fed from outside the core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    /// Whole-number counter, only ever incremented
    Counter,
    /// Fractional accumulator (seconds), only ever incremented
    Accumulator,
    /// Host-reported ratio in [0, 1], assigned
    Gauge,
    /// Computed from counters, read-only
    Derived,
    /// Owned by the progress tracker, read-only
    Progress,
}

/// Every metric an achievement criterion may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKey {
    FlightsStarted,
    FlightsCompleted,
    MissionsAttempted,
    MissionsCompleted,
    NightMissions,
    ObjectsDetected,
    DetectionsConfirmed,
    TotalFlightTimeS,
    SafeFlights,
    SafetyIncidents,
    IncidentFreeDays,
    AvgSystemPerformance,
    MissionSuccessRate,
    DetectionAccuracy,
    Level,
    TotalPoints,
}

impl StatKey {
    pub const ALL: [StatKey; 16] = [
        Self::FlightsStarted,
        Self::FlightsCompleted,
        Self::MissionsAttempted,
        Self::MissionsCompleted,
        Self::NightMissions,
        Self::ObjectsDetected,
        Self::DetectionsConfirmed,
        Self::TotalFlightTimeS,
        Self::SafeFlights,
        Self::SafetyIncidents,
        Self::IncidentFreeDays,
        Self::AvgSystemPerformance,
        Self::MissionSuccessRate,
        Self::DetectionAccuracy,
        Self::Level,
        Self::TotalPoints,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlightsStarted => "flights_started",
            Self::FlightsCompleted => "flights_completed",
            Self::MissionsAttempted => "missions_attempted",
            Self::MissionsCompleted => "missions_completed",
            Self::NightMissions => "night_missions",
            Self::ObjectsDetected => "objects_detected",
            Self::DetectionsConfirmed => "detections_confirmed",
            Self::TotalFlightTimeS => "total_flight_time_s",
            Self::SafeFlights => "safe_flights",
            Self::SafetyIncidents => "safety_incidents",
            Self::IncidentFreeDays => "incident_free_days",
            Self::AvgSystemPerformance => "avg_system_performance",
            Self::MissionSuccessRate => "mission_success_rate",
            Self::DetectionAccuracy => "detection_accuracy",
            Self::Level => "level",
            Self::TotalPoints => "total_points",
        }
    }

    pub fn kind(&self) -> StatKind {
        match self {
            Self::TotalFlightTimeS => StatKind::Accumulator,
            Self::AvgSystemPerformance => StatKind::Gauge,
            Self::MissionSuccessRate | Self::DetectionAccuracy => StatKind::Derived,
            Self::Level | Self::TotalPoints => StatKind::Progress,
            _ => StatKind::Counter,
        }
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown stat name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stat: {0}")]
pub struct UnknownStat(pub String);

impl FromStr for StatKey {
    type Err = UnknownStat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| UnknownStat(s.to_string()))
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Per-user statistics. Counters never decrease.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub flights_started: u64,
    pub flights_completed: u64,
    pub missions_attempted: u64,
    pub missions_completed: u64,
    pub night_missions: u64,
    pub objects_detected: u64,
    pub detections_confirmed: u64,
    pub total_flight_time_s: f64,
    pub safe_flights: u64,
    pub safety_incidents: u64,
    pub incident_free_days: u64,
    pub avg_system_performance: f64,
    pub last_activity: Option<DateTime<Utc>>,
}

impl UserStats {
    /// Completed over attempted missions; 1.0 before the first attempt
    #[must_use]
    pub fn mission_success_rate(&self) -> f64 {
        if self.missions_attempted == 0 {
            1.0
        } else {
            self.missions_completed as f64 / self.missions_attempted as f64
        }
    }

    /// Confirmed over reported detections; 0.0 before the first detection
    #[must_use]
    pub fn detection_accuracy(&self) -> f64 {
        if self.objects_detected == 0 {
            0.0
        } else {
            self.detections_confirmed as f64 / self.objects_detected as f64
        }
    }

    /// Value of a stat. `None` for progress metrics, which live on `UserProgress`.
    pub fn value(&self, key: StatKey) -> Option<f64> {
        let value = match key {
            StatKey::FlightsStarted => self.flights_started as f64,
            StatKey::FlightsCompleted => self.flights_completed as f64,
            StatKey::MissionsAttempted => self.missions_attempted as f64,
            StatKey::MissionsCompleted => self.missions_completed as f64,
            StatKey::NightMissions => self.night_missions as f64,
            StatKey::ObjectsDetected => self.objects_detected as f64,
            StatKey::DetectionsConfirmed => self.detections_confirmed as f64,
            StatKey::TotalFlightTimeS => self.total_flight_time_s,
            StatKey::SafeFlights => self.safe_flights as f64,
            StatKey::SafetyIncidents => self.safety_incidents as f64,
            StatKey::IncidentFreeDays => self.incident_free_days as f64,
            StatKey::AvgSystemPerformance => self.avg_system_performance,
            StatKey::MissionSuccessRate => self.mission_success_rate(),
            StatKey::DetectionAccuracy => self.detection_accuracy(),
            StatKey::Level | StatKey::TotalPoints => return None,
        };
        Some(value)
    }
}

// =============================================================================
// ACHIEVEMENTS
// =============================================================================

/// Immutable catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: AchievementKind,
    pub tier: AchievementTier,
    /// Every entry must hold simultaneously (`value >= required`)
    pub criteria: BTreeMap<StatKey, f64>,
    pub reward_points: u32,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub prerequisites: BTreeSet<String>,
}

/// Queued notification of a newly unlocked achievement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Celebration {
    pub id: Uuid,
    pub user_id: String,
    pub achievement: Achievement,
    pub points_earned: u32,
    pub unlocked_at: DateTime<Utc>,
}

impl Celebration {
    pub fn new(user_id: &str, achievement: &Achievement) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            achievement: achievement.clone(),
            points_earned: achievement.reward_points,
            unlocked_at: Utc::now(),
        }
    }
}

/// A user's earned achievements, points and undelivered celebrations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_id: String,
    /// Unlock order, append-only
    pub earned: Vec<String>,
    pub total_points: u64,
    pub level: u32,
    pub pending_celebrations: VecDeque<Celebration>,
}

impl UserProgress {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            earned: Vec::new(),
            total_points: 0,
            level: 1,
            pending_celebrations: VecDeque::new(),
        }
    }

    pub fn has_earned(&self, achievement_id: &str) -> bool {
        self.earned.iter().any(|id| id == achievement_id)
    }
}

// =============================================================================
// PROJECTIONS
// =============================================================================

/// Read-only dashboard projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub user_id: String,
    pub level: u32,
    pub total_points: u64,
    pub achievements_earned: usize,
    pub earned_ids: Vec<String>,
    /// Fraction of the way from the current level to the next, in [0, 1]
    pub level_progress: f64,
    pub next_level_points_required: u64,
    pub pending_celebrations: Vec<Celebration>,
    pub stats: UserStats,
}

/// Leaderboard entry - ranked by points, then level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub total_points: u64,
    pub level: u32,
    pub achievements_count: usize,
    pub flights_completed: u64,
    pub missions_completed: u64,
}

/// Pushed to subscribers when an achievement is generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementUnlocked {
    pub user_id: String,
    pub celebration: Celebration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_key_names_parse_back() {
        for key in StatKey::ALL {
            assert_eq!(key.as_str().parse::<StatKey>(), Ok(key));
            let json = serde_json::to_string(&key).unwrap();
            assert_eq!(json, format!("\"{}\"", key.as_str()));
        }
        assert!("altitude_record".parse::<StatKey>().is_err());
    }

    #[test]
    fn test_derived_ratios() {
        let mut stats = UserStats::default();
        assert_eq!(stats.mission_success_rate(), 1.0);
        assert_eq!(stats.detection_accuracy(), 0.0);

        stats.missions_attempted = 4;
        stats.missions_completed = 3;
        stats.objects_detected = 10;
        stats.detections_confirmed = 9;
        assert!((stats.value(StatKey::MissionSuccessRate).unwrap() - 0.75).abs() < 1e-9);
        assert!((stats.value(StatKey::DetectionAccuracy).unwrap() - 0.9).abs() < 1e-9);
        assert_eq!(stats.value(StatKey::Level), None);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(AchievementTier::Bronze < AchievementTier::Silver);
        assert!(AchievementTier::Platinum < AchievementTier::Legendary);
    }
}
