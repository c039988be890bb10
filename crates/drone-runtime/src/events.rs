//! # Event Streams
//!
//! Subscriber-facing streams over the core's broadcast channels. Slow
//! subscribers skip what they missed; publishers never wait on them.

use futures_util::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use drone_domain::{AchievementUnlocked, Alert, AlertSeverity, DroneState, Mission};

use crate::context::DroneCore;

/// Receive from `rx` until the channel closes, keeping items that pass
/// `filter`.
fn filtered<T, F>(
    mut rx: broadcast::Receiver<T>,
    stream_name: &'static str,
    filter: F,
) -> impl Stream<Item = T>
where
    T: Clone + Send + 'static,
    F: Fn(&T) -> bool + Send + 'static,
{
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(item) => {
                    if filter(&item) {
                        yield item;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(stream = stream_name, skipped, "Subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

/// Drone state after every tick
pub fn telemetry_stream(core: &DroneCore) -> impl Stream<Item = DroneState> + use<> {
    filtered(core.telemetry_tx.subscribe(), "telemetry", |_| true)
}

/// Mission snapshots on start, pause, resume, progress and termination
pub fn mission_stream(core: &DroneCore) -> impl Stream<Item = Mission> + use<> {
    filtered(core.mission_tx.subscribe(), "mission", |_| true)
}

/// Achievement unlocks, optionally for a single user
pub fn achievement_stream(
    core: &DroneCore,
    user_id: Option<String>,
) -> impl Stream<Item = AchievementUnlocked> + use<> {
    filtered(core.achievement_tx.subscribe(), "achievement", move |event| {
        user_id.as_deref().is_none_or(|user| event.user_id == user)
    })
}

/// Alerts at or above `min_severity`
pub fn alert_stream(
    core: &DroneCore,
    min_severity: AlertSeverity,
) -> impl Stream<Item = Alert> + use<> {
    filtered(core.alert_tx.subscribe(), "alert", move |alert| {
        alert.severity.at_least(min_severity)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use drone_progress::{AchievementCatalog, LevelCurve, ProgressTracker};
    use drone_simulator::{DroneSimulator, SimConfig};
    use futures_util::{StreamExt, pin_mut};

    use crate::context::DroneCoreBuilder;

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

    #[tokio::test]
    async fn test_telemetry_stream_receives_ticks() {
        let core = core();
        let stream = telemetry_stream(&core);
        pin_mut!(stream);

        core.tick(1.0).await;
        core.tick(1.0).await;

        let first = stream.next().await.unwrap();
        let second = stream.next().await.unwrap();
        assert!(!first.flying);
        assert!(second.timestamp >= first.timestamp);
    }

    #[tokio::test]
    async fn test_achievement_stream_filters_by_user() {
        let core = core();
        let stream = achievement_stream(&core, Some("bob".to_string()));
        pin_mut!(stream);

        core.record_stat("alice", "flights_completed", 1.0).unwrap();
        core.record_stat("bob", "flights_completed", 1.0).unwrap();

        let unlocked = stream.next().await.unwrap();
        assert_eq!(unlocked.user_id, "bob");
        assert_eq!(unlocked.celebration.achievement.id, "first_flight");
    }

    #[tokio::test]
    async fn test_alert_stream_respects_severity() {
        let core = core();
        let stream = alert_stream(&core, AlertSeverity::Critical);
        pin_mut!(stream);

        // Achievement alert is informational and filtered out
        core.record_stat("alice", "flights_completed", 1.0).unwrap();
        core.arm().await.unwrap();
        core.emergency_stop().await.unwrap();

        let alert = stream.next().await.unwrap();
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.kind, "SAFETY_INCIDENT");
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_ahead() {
        let core = DroneCoreBuilder::new()
            .with_simulator(DroneSimulator::new(SimConfig::default()))
            .with_progress(ProgressTracker::new(
                Arc::new(AchievementCatalog::builtin()),
                LevelCurve::default(),
            ))
            .with_channel_capacity(2)
            .build()
            .unwrap();
        let stream = telemetry_stream(&core);
        pin_mut!(stream);

        for _ in 0..5 {
            core.tick(1.0).await;
        }
        let last = core.current_state().await;

        let mut received = Vec::new();
        received.push(stream.next().await.unwrap());
        received.push(stream.next().await.unwrap());
        assert_eq!(received[1].timestamp, last.timestamp);
    }
}
