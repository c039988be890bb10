//! # Runtime Configuration
//!
//! Environment-based configuration for the sortie runtime.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use drone_domain::Position;
use drone_progress::LevelCurve;
use drone_simulator::{FlightLimits, LowBatteryPolicy, SimConfig, TelemetryConfig};

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Ticker period
    pub tick_interval: Duration,

    /// Simulator RNG seed
    pub sim_seed: u64,

    /// User credited with simulator events
    pub operator_id: String,

    pub arm_min_battery_pct: f64,
    pub low_battery_warning_pct: f64,
    pub emergency_battery_pct: f64,
    pub low_battery_policy: LowBatteryPolicy,

    pub max_speed_mps: f64,
    pub max_altitude_m: f64,
    pub geofence_radius_m: f64,

    /// Mean objects per survey photo
    pub detection_burst_mean: f64,

    /// Launch point
    pub home_lat: f64,
    pub home_lng: f64,

    /// Points needed for level 2
    pub level_base_points: u64,

    /// Cost multiplier per level
    pub level_growth: f64,

    /// Capacity of every broadcast channel
    pub event_channel_capacity: usize,

    /// JSON catalog file; the built-in catalog when unset
    pub achievement_catalog_path: Option<PathBuf>,

    /// Logging level
    pub log_level: String,
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables. Missing or
    /// unparseable values fall back to defaults.
    pub fn from_env() -> Self {
        let home = Position::default();
        let limits = FlightLimits::default();
        let telemetry = TelemetryConfig::default();
        let defaults = SimConfig::default();

        Self {
            tick_interval: Duration::from_millis(
                parsed::<u64>("TICK_INTERVAL_MS").unwrap_or(1000).max(1),
            ),
            sim_seed: parsed("SIM_SEED").unwrap_or(defaults.seed),
            operator_id: env::var("OPERATOR_ID")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "operator".to_string()),

            arm_min_battery_pct: parsed("ARM_MIN_BATTERY_PCT")
                .unwrap_or(limits.arm_min_battery_pct),
            low_battery_warning_pct: parsed("LOW_BATTERY_WARNING_PCT")
                .unwrap_or(telemetry.low_battery_warning_pct),
            emergency_battery_pct: parsed("EMERGENCY_BATTERY_PCT")
                .unwrap_or(telemetry.emergency_battery_pct),
            low_battery_policy: parsed("LOW_BATTERY_POLICY")
                .unwrap_or(telemetry.low_battery_policy),

            max_speed_mps: parsed("MAX_SPEED_MPS").unwrap_or(telemetry.max_speed_mps),
            max_altitude_m: parsed("MAX_ALTITUDE_M").unwrap_or(limits.max_altitude_m),
            geofence_radius_m: parsed("GEOFENCE_RADIUS_M").unwrap_or(limits.geofence_radius_m),
            detection_burst_mean: parsed("DETECTION_BURST_MEAN")
                .unwrap_or(defaults.detection_burst_mean),

            home_lat: parsed("HOME_LAT").unwrap_or(home.lat),
            home_lng: parsed("HOME_LNG").unwrap_or(home.lng),

            level_base_points: parsed("LEVEL_BASE_POINTS").unwrap_or(100),
            level_growth: parsed("LEVEL_GROWTH").unwrap_or(1.2),

            event_channel_capacity: parsed::<usize>("EVENT_CHANNEL_CAPACITY")
                .unwrap_or(1024)
                .max(1),

            achievement_catalog_path: env::var("ACHIEVEMENT_CATALOG_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Launch point at ground level
    pub fn home(&self) -> Position {
        Position::new(self.home_lat, self.home_lng, 0.0)
    }

    /// Simulator parameters derived from this configuration
    pub fn sim_config(&self) -> SimConfig {
        let limits = FlightLimits {
            arm_min_battery_pct: self.arm_min_battery_pct,
            max_altitude_m: self.max_altitude_m,
            geofence_radius_m: self.geofence_radius_m,
            ..FlightLimits::default()
        };
        let telemetry = TelemetryConfig {
            max_speed_mps: self.max_speed_mps,
            low_battery_warning_pct: self.low_battery_warning_pct,
            emergency_battery_pct: self.emergency_battery_pct,
            low_battery_policy: self.low_battery_policy,
            ..TelemetryConfig::default()
        };
        SimConfig {
            seed: self.sim_seed,
            home: self.home(),
            limits,
            telemetry,
            detection_burst_mean: self.detection_burst_mean,
        }
    }

    pub fn level_curve(&self) -> LevelCurve {
        LevelCurve::new(self.level_base_points, self.level_growth)
    }

}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_config_carries_overrides() {
        let config = Config {
            sim_seed: 7,
            max_altitude_m: 80.0,
            low_battery_policy: LowBatteryPolicy::AlertOnly,
            detection_burst_mean: 1.5,
            home_lat: 10.0,
            home_lng: 20.0,
            ..Config::from_env()
        };
        let sim = config.sim_config();
        assert_eq!(sim.seed, 7);
        assert_eq!(sim.limits.max_altitude_m, 80.0);
        assert_eq!(sim.limits.min_altitude_m, FlightLimits::default().min_altitude_m);
        assert_eq!(sim.telemetry.low_battery_policy, LowBatteryPolicy::AlertOnly);
        assert_eq!(sim.home, Position::new(10.0, 20.0, 0.0));
        assert_eq!(sim.detection_burst_mean, 1.5);
    }

    #[test]
    fn test_level_curve_from_config() {
        let config = Config {
            level_base_points: 50,
            level_growth: 2.0,
            ..Config::from_env()
        };
        let curve = config.level_curve();
        assert_eq!(curve.level_for(49), 1);
        assert_eq!(curve.level_for(50), 2);
        assert_eq!(curve.points_for_level(3), 150);
    }
}
