//! # Ticker
//!
//! The background task that drives the simulation. It is the only caller
//! of `DroneCore::tick`.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::context::DroneCore;

/// Handle to a running ticker task
pub struct TickerHandle {
    shutdown_tx: broadcast::Sender<()>,
    join: JoinHandle<u64>,
}

impl TickerHandle {
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Signal shutdown and wait for the task. A tick already in progress
    /// finishes first. Returns the number of ticks run.
    pub async fn stop(self) -> u64 {
        let _ = self.shutdown_tx.send(());
        match self.join.await {
            Ok(ticks) => ticks,
            Err(err) => {
                warn!(error = %err, "Ticker task ended abnormally");
                0
            }
        }
    }
}

/// Spawn the ticker. Each tick advances the simulation by `period` of
/// simulated time.
pub fn spawn_ticker(core: DroneCore, period: Duration) -> TickerHandle {
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let dt = period.as_secs_f64();

    let join = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0u64;

        info!(period_ms = period.as_millis() as u64, "Ticker started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!(ticks, "Ticker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    core.tick(dt).await;
                    ticks += 1;
                }
            }
        }
        ticks
    });

    TickerHandle { shutdown_tx, join }
}
