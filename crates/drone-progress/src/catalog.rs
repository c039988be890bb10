//! Achievement catalog: built-in defaults and JSON loading.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

use drone_domain::{Achievement, AchievementKind, AchievementTier, StatKey};

use crate::error::CatalogError;

/// Validated, read-only list of achievements in evaluation order.
#[derive(Debug, Clone, PartialEq)]
pub struct AchievementCatalog {
    achievements: Vec<Achievement>,
}

impl AchievementCatalog {
    /// Build a catalog, rejecting duplicate ids, zero rewards, bad thresholds,
    /// unknown prerequisites and prerequisite cycles.
    pub fn new(achievements: Vec<Achievement>) -> Result<Self, CatalogError> {
        let mut ids = HashSet::new();
        for achievement in &achievements {
            if !ids.insert(achievement.id.as_str()) {
                return Err(CatalogError::DuplicateId(achievement.id.clone()));
            }
            if achievement.reward_points == 0 {
                return Err(CatalogError::InvalidReward(achievement.id.clone()));
            }
            if let Some((&stat, _)) = achievement
                .criteria
                .iter()
                .find(|(_, required)| !required.is_finite() || **required < 0.0)
            {
                return Err(CatalogError::InvalidCriterion {
                    id: achievement.id.clone(),
                    stat,
                });
            }
        }

        for achievement in &achievements {
            if let Some(missing) = achievement
                .prerequisites
                .iter()
                .find(|id| !ids.contains(id.as_str()))
            {
                return Err(CatalogError::UnknownPrerequisite {
                    id: achievement.id.clone(),
                    prerequisite: missing.clone(),
                });
            }
        }

        detect_cycles(&achievements)?;
        Ok(Self { achievements })
    }

    /// Parse a JSON array of achievements.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let achievements: Vec<Achievement> = serde_json::from_str(json)?;
        Self::new(achievements)
    }

    /// Load a JSON catalog file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// The default operator catalog.
    pub fn builtin() -> Self {
        use AchievementKind::{Detection, Flight, Milestone, Mission, Performance, Safety};
        use AchievementTier::{Bronze, Gold, Legendary, Platinum, Silver};
        use StatKey as S;

        #[rustfmt::skip]
        let mut achievements = vec![
            entry("first_flight", "First Flight", "Complete your first successful drone flight", Flight, Bronze, &[(S::FlightsCompleted, 1.0)], 50, "🚁"),
            entry("flight_veteran", "Flight Veteran", "Complete 50 successful flights", Flight, Silver, &[(S::FlightsCompleted, 50.0)], 200, "✈️"),
            entry("sky_master", "Sky Master", "Complete 200 flights and accumulate 50+ hours of flight time", Flight, Gold, &[(S::FlightsCompleted, 200.0), (S::TotalFlightTimeS, 180_000.0)], 500, "🏆"),
            entry("mission_rookie", "Mission Rookie", "Successfully complete your first surveillance mission", Mission, Bronze, &[(S::MissionsCompleted, 1.0)], 75, "🎯"),
            entry("mission_commander", "Mission Commander", "Complete 25 surveillance missions with 95%+ success rate", Mission, Gold, &[(S::MissionsCompleted, 25.0), (S::MissionSuccessRate, 0.95)], 400, "🎖️"),
            entry("eagle_eye", "Eagle Eye", "Successfully detect 100 objects during flights", Detection, Silver, &[(S::ObjectsDetected, 100.0)], 150, "👁️"),
            entry("surveillance_expert", "Surveillance Expert", "Detect 1000 objects with 90%+ accuracy", Detection, Platinum, &[(S::ObjectsDetected, 1000.0), (S::DetectionAccuracy, 0.90)], 750, "🔍"),
            entry("safety_first", "Safety First", "Complete 10 flights without any safety incidents", Safety, Bronze, &[(S::SafeFlights, 10.0)], 100, "🛡️"),
            entry("incident_free", "Incident Free", "Operate for 30 days without safety incidents", Safety, Gold, &[(S::IncidentFreeDays, 30.0)], 300, "⚡"),
            entry("system_optimizer", "System Optimizer", "Achieve average system performance above 95%", Performance, Silver, &[(S::AvgSystemPerformance, 0.95)], 200, "⚙️"),
            entry("night_owl", "Night Owl", "Complete 10 successful night missions", Mission, Silver, &[(S::NightMissions, 10.0)], 250, "🌙"),
            entry("drone_operator", "Certified Drone Operator", "Reach level 10 and earn 1000 points", Milestone, Gold, &[(S::Level, 10.0), (S::TotalPoints, 1000.0)], 500, "🎓"),
            entry("legendary_pilot", "Legendary Pilot", "The ultimate drone operator - master of all aspects", Milestone, Legendary, &[(S::Level, 25.0), (S::TotalPoints, 5000.0), (S::FlightsCompleted, 500.0), (S::MissionsCompleted, 100.0), (S::ObjectsDetected, 5000.0)], 2000, "👑"),
        ];

        if let Some(legendary) = achievements.last_mut() {
            legendary.hidden = true;
            legendary.prerequisites = ["drone_operator", "sky_master"]
                .into_iter()
                .map(String::from)
                .collect();
        }

        Self { achievements }
    }

    pub fn get(&self, id: &str) -> Option<&Achievement> {
        self.achievements.iter().find(|a| a.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Achievement> {
        self.achievements.iter()
    }

    pub fn len(&self) -> usize {
        self.achievements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.achievements.is_empty()
    }
}

#[allow(clippy::too_many_arguments)]
fn entry(
    id: &str,
    name: &str,
    description: &str,
    kind: AchievementKind,
    tier: AchievementTier,
    criteria: &[(StatKey, f64)],
    reward_points: u32,
    icon: &str,
) -> Achievement {
    Achievement {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        kind,
        tier,
        criteria: criteria.iter().copied().collect::<BTreeMap<_, _>>(),
        reward_points,
        icon: icon.to_string(),
        hidden: false,
        prerequisites: BTreeSet::new(),
    }
}

/// Depth-first search over the prerequisite graph.
fn detect_cycles(achievements: &[Achievement]) -> Result<(), CatalogError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        id: &'a str,
        graph: &HashMap<&'a str, &'a Achievement>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Result<(), CatalogError> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(CatalogError::PrerequisiteCycle(id.to_string())),
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        if let Some(&achievement) = graph.get(id) {
            for prerequisite in &achievement.prerequisites {
                visit(prerequisite, graph, marks)?;
            }
        }
        marks.insert(id, Mark::Done);
        Ok(())
    }

    let graph: HashMap<&str, &Achievement> =
        achievements.iter().map(|a| (a.id.as_str(), a)).collect();
    let mut marks = HashMap::new();
    for achievement in achievements {
        visit(&achievement.id, &graph, &mut marks)?;
    }
    Ok(())
}
