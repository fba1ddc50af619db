//! Robot Core Binary
//!
//! Runs the orchestration core against file-based timetable and journal
//! sources, with a dry-run execution adapter and passive streams.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin robot-core -- --config config.yaml
//! ```
//!
//! # Environment Variables
//!
//! - `ROBOT_CORE_CONFIG`: config file path (same as `--config`)
//! - `RUST_LOG`: log filter (overrides `observability.logging.level`)
//! - any `${VAR}` referenced from the config file

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use robot_core::application::ports::{DryRunExecutionAdapter, NotificationSink};
use robot_core::application::{
    AlertDispatcher, ConnectionLossCoordinator, EngineDeps, HealthMonitor, RobotEngine,
    StreamActivity,
};
use robot_core::config::{RobotConfig, load_config};
use robot_core::domain::shared::RunId;
use robot_core::domain::trading_spec::TradingSpec;
use robot_core::infrastructure::notification::{KindThrottle, transport_from_config};
use robot_core::infrastructure::{
    FileJournalReader, FileTimetableSource, JsonlEventLog, NotificationService,
    PassiveStreamFactory, ZoneCalendar, metrics, telemetry,
};

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "robot-core", version, about = "Fail-closed trading robot core")]
struct Args {
    /// Configuration file.
    #[arg(long, env = "ROBOT_CORE_CONFIG", default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    let args = Args::parse();

    let config = load_config(Some(&args.config))
        .with_context(|| format!("loading configuration from {}", args.config))?;
    telemetry::init(&config.observability.logging);

    let run_id = RunId::generate();
    tracing::info!(
        run_id = %run_id,
        mode = %config.environment.mode,
        config = %args.config,
        "Starting robot core"
    );

    if config.observability.metrics_port != 0 {
        metrics::init_metrics(config.observability.metrics_port)?;
    }

    let spec = TradingSpec::load(&config.paths.spec_path)
        .with_context(|| format!("loading trading spec from {}", config.paths.spec_path))?;

    let cancel = CancellationToken::new();
    let (engine, monitor, background) = build(&config, run_id, spec, &cancel).await?;

    let health_handle = Arc::clone(&monitor).spawn(cancel.clone());

    if let Err(e) = engine.start(Utc::now()).await {
        tracing::error!(error = %e, "Engine refused to start");
        cancel.cancel();
        let _ = health_handle.await;
        for handle in background {
            let _ = handle.await;
        }
        return Err(e.into());
    }
    tracing::info!("Robot core ready");

    let mut interval = tokio::time::interval(config.engine.tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = interval.tick() => engine.tick(Utc::now()).await,
        }
    }

    engine.stop(Utc::now()).await;
    cancel.cancel();
    let _ = health_handle.await;
    for handle in background {
        let _ = handle.await;
    }

    tracing::info!("Robot core stopped");
    Ok(())
}

/// Wire adapters and core components.
async fn build(
    config: &RobotConfig,
    run_id: RunId,
    spec: TradingSpec,
    cancel: &CancellationToken,
) -> anyhow::Result<(RobotEngine, Arc<HealthMonitor>, Vec<tokio::task::JoinHandle<()>>)> {
    let (events, events_handle) = JsonlEventLog::spawn(
        &config.paths.event_log_path,
        config.observability.event_log_queue_capacity,
        cancel.clone(),
    );

    let transport = transport_from_config(&config.notifications)?;
    let throttle = KindThrottle::load(
        &config.notifications.state_path,
        config.notifications.global_min_interval(),
    )
    .await;
    let (notifications, notifications_handle) = NotificationService::spawn(
        throttle,
        transport,
        config.notifications.queue_capacity,
        cancel.clone(),
    );
    let sink: Arc<dyn NotificationSink> = Arc::new(notifications);

    let alerts = Arc::new(AlertDispatcher::new(
        sink,
        config.health.notification_min_interval(),
    ));
    let activity = Arc::new(StreamActivity::new());
    let monitor = Arc::new(HealthMonitor::new(
        config.health.clone(),
        alerts,
        Arc::new(ConnectionLossCoordinator::new()),
        activity.clone(),
    ));

    let deps = EngineDeps {
        spec: Arc::new(spec),
        calendar: Arc::new(ZoneCalendar::supported()),
        timetable: Arc::new(FileTimetableSource::new(&config.paths.timetable_path)),
        journal: Arc::new(FileJournalReader::new(&config.paths.journal_dir)),
        streams: Arc::new(PassiveStreamFactory),
        execution: Arc::new(DryRunExecutionAdapter),
        events: Arc::new(events),
        health: Arc::clone(&monitor),
        activity,
    };
    let engine = RobotEngine::new(config, run_id, deps)?;

    Ok((engine, monitor, vec![events_handle, notifications_handle]))
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGINT or SIGTERM.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
