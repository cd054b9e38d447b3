//! CLI binary for vigil.

use clap::{Parser, Subcommand};
use chrono::{Local, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use vigil::audit::AuditLog;
use vigil::decision::DecisionEngine;
use vigil::health::HealthMonitor;
use vigil::messaging::ExternalMessenger;
use vigil::runner::CommandRunner;
use vigil::state::StateStore;
use vigil::status::StatusReport;
use vigil::worker::{ProcessWorker, Worker};
use vigil::{Orchestrator, VigilConfig, VigilError, Watchdog, WatchdogReport};

/// Vigil: tick scheduler and worker supervisor.
#[derive(Parser)]
#[command(name = "vigil", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Decide, execute and record one action.
    Tick,

    /// Check worker liveness and recover if needed.
    Watchdog,

    /// Probe worker health once, restarting it if unhealthy.
    Health,

    /// Record activity for a user now.
    Touch {
        /// User identifier.
        user_id: String,
    },

    /// Print persisted state and recent audit entries.
    Status {
        /// Number of audit entries to include.
        #[arg(long, default_value_t = 20)]
        audit: usize,
    },

    /// Print the action the next tick would take, without running it.
    Decide,
}

/// Everything one invocation needs, built from config.
struct Context {
    config: VigilConfig,
    store: StateStore,
    audit: AuditLog,
    worker: Arc<dyn Worker>,
}

impl Context {
    fn new(config: VigilConfig) -> Self {
        let store = StateStore::from_config(&config);
        let audit =
            AuditLog::new(store.paths.audit_log()).with_max_bytes(config.audit.max_bytes);
        let worker: Arc<dyn Worker> = Arc::new(ProcessWorker::new(
            config.worker.clone(),
            config.restart.clone(),
        ));
        Self {
            config,
            store,
            audit,
            worker,
        }
    }

    fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(
            Arc::clone(&self.worker),
            &self.config.health,
            self.config.restart.clone(),
            self.store.health.clone(),
            self.audit.clone(),
        )
    }

    fn orchestrator(&self) -> Orchestrator {
        let runner = CommandRunner::new(
            Arc::clone(&self.worker),
            Arc::new(ExternalMessenger::new(self.config.messaging.clone())),
            self.config.worker.timeout(),
            self.config.restart.clone(),
            self.config.messaging.greetings.clone(),
            self.audit.clone(),
        )
        .with_crash_budget(
            self.store.crash_budget.clone(),
            self.config.watchdog.max_crashes,
        );
        Orchestrator::new(
            DecisionEngine::new(self.config.decision.clone()),
            self.store.clone(),
            runner,
            self.audit.clone(),
        )
    }

    fn watchdog(&self) -> Watchdog {
        Watchdog::new(
            Arc::clone(&self.worker),
            self.health_monitor(),
            self.store.crash_budget.clone(),
            self.store.liveness.clone(),
            self.config.watchdog.clone(),
            self.config.restart.clone(),
            self.audit.clone(),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = VigilConfig::load(cli.config.as_deref())?;
    let ctx = Context::new(config);
    let _log_guard = vigil::logging::init(&ctx.store.paths.logs_dir());

    match cli.command {
        Command::Tick => run_tick(&ctx).await,
        Command::Watchdog => run_watchdog(&ctx).await,
        Command::Health => run_health(&ctx).await,
        Command::Touch { user_id } => {
            vigil::orchestrator::record_user_activity(&ctx.store, &ctx.audit, &user_id, Utc::now())
                .await?;
            Ok(())
        }
        Command::Status { audit } => {
            let report = StatusReport::collect(&ctx.store, &ctx.audit, Utc::now(), audit);
            print_json(&report)
        }
        Command::Decide => {
            let action = ctx.orchestrator().preview(Local::now().fixed_offset());
            print_json(&action)
        }
    }
}

async fn run_tick(ctx: &Context) -> anyhow::Result<()> {
    match ctx.orchestrator().tick(Local::now().fixed_offset()).await {
        Ok(report) => print_json(&report),
        Err(VigilError::Lock(reason)) => {
            tracing::info!("skipping tick: {reason}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_watchdog(ctx: &Context) -> anyhow::Result<()> {
    let _worker_lock = match ctx.store.lock_worker().await {
        Ok(guard) => guard,
        Err(VigilError::Lock(reason)) => {
            tracing::info!("worker busy, skipping watchdog pass: {reason}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let report = ctx.watchdog().monitor(Utc::now()).await?;
    print_json(&report)?;
    if let WatchdogReport::Escalated { count, max } = report {
        anyhow::bail!("crash budget exhausted ({count}/{max}), manual intervention required");
    }
    Ok(())
}

async fn run_health(ctx: &Context) -> anyhow::Result<()> {
    let _worker_lock = ctx.store.lock_worker().await?;
    let status = ctx.health_monitor().restart_if_needed().await?;
    println!("{status}");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
