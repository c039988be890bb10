//! # Drone Sortie Runtime
//!
//! Binary entry point: runs the simulation ticker until interrupted or for
//! a fixed duration, optionally flying a scripted demo sortie.

use std::pin::pin;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use futures_util::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drone_domain::MissionStatus;
use drone_progress::AchievementCatalog;
use drone_runtime::{
    Config, CoreResult, DroneCore, mission_stream, spawn_ticker, telemetry_stream,
};
use drone_simulator::PatternGenerator;

#[derive(Parser, Debug)]
#[command(name = "drone-runtime")]
#[command(about = "Run the single-drone sortie simulation")]
struct Args {
    /// Tick interval in milliseconds (overrides TICK_INTERVAL_MS)
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Simulator seed (overrides SIM_SEED)
    #[arg(long)]
    seed: Option<u64>,

    /// Operator credited with flight stats (overrides OPERATOR_ID)
    #[arg(short, long)]
    operator: Option<String>,

    /// Stop after this many seconds instead of waiting for a signal
    #[arg(short, long)]
    duration: Option<u64>,

    /// Fly a scripted perimeter sortie
    #[arg(long)]
    demo: bool,

    /// Demo sortie altitude in meters
    #[arg(long, default_value = "30")]
    demo_altitude: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = Config::from_env();
    if let Some(tick_ms) = args.tick_ms {
        config.tick_interval = Duration::from_millis(tick_ms.max(1));
    }
    if let Some(seed) = args.seed {
        config.sim_seed = seed;
    }
    if let Some(operator) = args.operator.clone() {
        config.operator_id = operator;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(version = drone_runtime::VERSION, "Starting drone sortie runtime");

    let catalog = match &config.achievement_catalog_path {
        Some(path) => AchievementCatalog::from_path(path)
            .with_context(|| format!("loading achievement catalog {}", path.display()))?,
        None => AchievementCatalog::builtin(),
    };
    info!(
        achievements = catalog.len(),
        custom = config.achievement_catalog_path.is_some(),
        "Achievement catalog loaded"
    );

    let core = DroneCore::from_config(&config, catalog);

    info!(
        tick_ms = config.tick_interval.as_millis() as u64,
        seed = config.sim_seed,
        operator = %config.operator_id,
        policy = %config.low_battery_policy,
        "Simulation configured"
    );

    let ticker = spawn_ticker(core.clone(), config.tick_interval);

    let demo = args.demo.then(|| {
        let core = core.clone();
        let altitude_m = args.demo_altitude;
        tokio::spawn(async move {
            if let Err(err) = run_demo_sortie(&core, altitude_m).await {
                warn!(error = %err, code = err.error_code(), "Demo sortie failed");
            }
        })
    });

    match args.duration {
        Some(secs) => {
            tokio::select! {
                () = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!(secs, "Run duration elapsed");
                }
                () = shutdown_signal() => {}
            }
        }
        None => shutdown_signal().await,
    }

    if let Some(demo) = demo {
        demo.abort();
    }
    let ticks = ticker.stop().await;

    let state = core.current_state().await;
    let dashboard = core.dashboard(&config.operator_id);
    info!(
        ticks,
        flying = state.flying,
        battery = state.battery_pct,
        level = dashboard.level,
        points = dashboard.total_points,
        achievements = dashboard.achievements_earned,
        flights = dashboard.stats.flights_completed,
        missions = dashboard.stats.missions_completed,
        "Final operator dashboard"
    );
    match serde_json::to_string(&dashboard) {
        Ok(json) => info!(dashboard = %json, "Dashboard snapshot"),
        Err(err) => warn!(error = %err, "Failed to serialize dashboard"),
    }
    for entry in core.leaderboard(5) {
        info!(
            rank = entry.rank,
            user = %entry.user_id,
            points = entry.total_points,
            level = entry.level,
            "Leaderboard"
        );
    }

    info!("Runtime shut down gracefully");
    Ok(())
}

/// Arm, climb, fly a perimeter mission around home, then return to launch.
async fn run_demo_sortie(core: &DroneCore, altitude_m: f64) -> CoreResult<()> {
    let mut telemetry = pin!(telemetry_stream(core));
    let mut missions = pin!(mission_stream(core));

    core.arm().await?;
    core.takeoff(altitude_m).await?;
    while let Some(state) = telemetry.next().await {
        if (state.position.alt_m - altitude_m).abs() < 0.5 {
            break;
        }
    }

    let home = core.current_state().await.home;
    let template = PatternGenerator::new(home, altitude_m).perimeter("Demo Perimeter", 80.0, 6);
    let mission = core.start_mission(&template).await?;
    info!(mission_id = %mission.id, waypoints = mission.waypoints.len(), "Demo mission started");

    let mut completed = false;
    while let Some(snapshot) = missions.next().await {
        if snapshot.id == mission.id && !snapshot.is_running() {
            info!(
                status = ?snapshot.status,
                detected = snapshot.objects_detected,
                "Demo mission finished"
            );
            completed = snapshot.status == MissionStatus::Completed;
            break;
        }
    }

    // An aborted sortie is already landing or grounded
    if completed && core.current_state().await.flying {
        core.return_to_launch().await?;
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
