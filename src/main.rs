//! coachloop - daily coaching loop service.
//!
//! Usage:
//!   coachloop run [-c <config>]       Rebuild pending jobs and run the scheduler
//!   coachloop rebuild [-c <config>]   Rebuild pending jobs, list them and exit
//!   coachloop validate -c <config>    Validate a configuration file

use clap::{Parser, Subcommand};
use coachloop::{
    Coach, CoachConfig, Event, EventBus, EventHandler, InMemoryStorage, RebuildManager, Scheduler,
    Storage, StorageConfig, SystemClock, YamlLoader,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// coachloop - daily coaching loop service
#[derive(Parser)]
#[command(name = "coachloop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild pending jobs and run the scheduler until Ctrl+C
    Run {
        /// Path to the configuration file (defaults apply when omitted)
        #[arg(short = 'c', long, value_name = "CONFIG")]
        config: Option<PathBuf>,
    },

    /// Rebuild pending jobs from storage, print them and exit
    Rebuild {
        /// Path to the configuration file (defaults apply when omitted)
        #[arg(short = 'c', long, value_name = "CONFIG")]
        config: Option<PathBuf>,
    },

    /// Validate a configuration file without running
    Validate {
        /// Path to the configuration file
        #[arg(short = 'c', long, value_name = "CONFIG")]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Serve,
    RebuildOnly,
}

/// Logs bus events.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::JobFired {
                job_id,
                scheduled_for,
                ..
            } => {
                info!("Job '{}' fired (scheduled for {})", job_id, scheduled_for);
            }
            Event::JobDispatchFailed { job_id, error, .. } => {
                warn!("Job '{}' dispatch failed: {}", job_id, error);
            }
            Event::RebuildCompleted {
                registered,
                skipped,
                failures,
                ..
            } => {
                info!(
                    "Rebuild finished: {} registered, {} skipped, {} failed",
                    registered, skipped, failures
                );
            }
            other => match other.user_id() {
                Some(user_id) => info!("event={} user={}", other.name(), user_id),
                None => info!("event={}", other.name()),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => start(load_config(config)?, Mode::Serve).await,
        Commands::Rebuild { config } => start(load_config(config)?, Mode::RebuildOnly).await,
        Commands::Validate { config } => validate_config(config),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<CoachConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(YamlLoader::load_config(&path)?)
        }
        None => {
            info!("No configuration file given, using defaults");
            Ok(CoachConfig::default())
        }
    }
}

/// Validate a configuration file without running.
fn validate_config(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating configuration: {}", path.display());

    match YamlLoader::load_config(&path) {
        Ok(config) => {
            info!("Configuration is valid:");
            info!("  default timezone: {}", config.default_timezone);
            info!("  tick interval: {:?}", config.scheduler.tick_interval());
            info!("  storage: {:?}", config.storage);
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// Open the configured storage and hand it to [`serve`].
async fn start(config: CoachConfig, mode: Mode) -> Result<(), Box<dyn std::error::Error>> {
    match &config.storage {
        StorageConfig::Memory => {
            warn!("Using in-memory storage; nothing survives a restart");
            serve(Arc::new(InMemoryStorage::new()), &config, mode).await
        }
        #[cfg(feature = "sqlite")]
        StorageConfig::Sqlite { path } => {
            info!("Opening SQLite database: {}", path);
            let storage = coachloop::SqliteStorage::new(path).await?;
            serve(Arc::new(storage), &config, mode).await
        }
        #[cfg(not(feature = "sqlite"))]
        StorageConfig::Sqlite { .. } => {
            error!("SQLite storage requested but the `sqlite` feature is not enabled");
            Err("sqlite feature not enabled".into())
        }
    }
}

async fn serve<S: Storage + 'static>(
    storage: Arc<S>,
    config: &CoachConfig,
    mode: Mode,
) -> Result<(), Box<dyn std::error::Error>> {
    let timezone = config
        .timezone()
        .ok_or_else(|| format!("unknown timezone '{}'", config.default_timezone))?;

    let event_bus = Arc::new(EventBus::new());
    event_bus.register(Arc::new(LoggingHandler)).await;

    let clock = Arc::new(SystemClock);
    let scheduler = Scheduler::new(clock.clone())
        .with_event_bus(Arc::clone(&event_bus))
        .with_tick_interval(config.scheduler.tick_interval())
        .with_shutdown_timeout(config.scheduler.shutdown_timeout());
    let jobs = Arc::new(scheduler.handle());

    let coach = Arc::new(
        Coach::new(Arc::clone(&storage), jobs.clone(), clock.clone())
            .with_event_bus(Arc::clone(&event_bus))
            .with_limits(config.dialogue)
            .with_default_timezone(timezone),
    );

    let (handle, scheduler_task) = scheduler.start(coach).await;

    let report = RebuildManager::new(storage, jobs, clock)
        .with_event_bus(event_bus)
        .rebuild()
        .await?;
    if report.failures > 0 {
        warn!("{} job(s) could not be rebuilt", report.failures);
    }

    if mode == Mode::RebuildOnly {
        let pending = handle.jobs().await?;
        if pending.is_empty() {
            println!("No pending jobs");
        } else {
            println!("Pending jobs:");
            for job in &pending {
                println!("  {}  next: {}", job.spec.id, job.next_fire);
            }
        }
        handle.shutdown().await?;
        return Ok(());
    }

    info!("Scheduler running, press Ctrl+C to stop");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            handle.shutdown().await?;
        }
        _ = scheduler_task => {
            info!("Scheduler stopped");
        }
    }

    info!("Goodbye!");
    Ok(())
}
