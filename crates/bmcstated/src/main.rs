//! bmcstated - BMC state manager daemon
//!
//! Discovers the controller's state at startup, publishes it on a Unix
//! socket and keeps it current from systemd job notifications.

use anyhow::{Context, Result};
use bmcstate_common::VERSION;
use bmcstated::cause_store::FileCauseStore;
use bmcstated::config::{Config, CONFIG_PATH};
use bmcstated::discovery::Discovery;
use bmcstated::events::{BusctlMonitor, JobWatcher};
use bmcstated::init::Systemctl;
use bmcstated::manager::{Collaborators, Manager};
use bmcstated::notify::NotificationHandler;
use bmcstated::rpc_server;
use bmcstated::store::StateStore;
use bmcstated::transition::TransitionExecutor;
use bmcstated::uptime::{ProcUptime, SystemClock};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Buffered job notifications awaiting the manager
const EVENT_QUEUE_DEPTH: usize = 64;

#[derive(Parser)]
#[command(name = "bmcstated", version = VERSION, about = "BMC state manager daemon")]
struct Args {
    /// Configuration file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let loaded = Config::load(&args.config)?;
    let found = loaded.is_some();
    let config = loaded.unwrap_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("[BOOT] bmcstated v{} starting", VERSION);
    if found {
        info!("[BOOT] Loaded config from {}", args.config.display());
    } else {
        warn!("[BOOT] Config {} not found, using defaults", args.config.display());
    }

    let systemctl = Arc::new(Systemctl::default());
    let causes = Arc::new(FileCauseStore::new(&config.cause_store_path));

    // Subscribe before discovery so a job finishing in between is not lost
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let watcher = match JobWatcher::start(&BusctlMonitor::default(), event_tx).await {
        Ok(w) => Some(w),
        Err(e) => {
            warn!("[BOOT] Job notifications unavailable, state will not self-update: {}", e);
            None
        }
    };

    let uptime = ProcUptime::new(&config.uptime_path);
    let initial = Discovery {
        units: systemctl.as_ref(),
        uptime: &uptime,
        clock: &SystemClock,
        causes: causes.as_ref(),
        ready_unit: &config.ready_unit,
        watchdog_bootstatus: config.watchdog_bootstatus_path.as_deref(),
        query_timeout: config.query_timeout(),
    }
    .run()
    .await;

    let manager = Manager::new(
        StateStore::new(initial),
        Collaborators {
            units: systemctl.clone(),
            jobs: systemctl,
            causes,
        },
        TransitionExecutor::new(
            &config.reboot_target,
            &config.off_target,
            config.job_mode,
            config.query_timeout(),
        ),
        NotificationHandler::new(&config.ready_unit, config.query_timeout()),
    );
    let (handle, commands) = manager.channel();

    // Published only after discovery completed
    let listener = rpc_server::bind(&config.socket_path).await?;
    let manager_task = tokio::spawn(manager.run(commands, event_rx));

    info!("[READY] bmcstated operational");

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let result = tokio::select! {
        res = rpc_server::serve(listener, handle) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("SIGINT received");
            Ok(())
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received");
            Ok(())
        }
    };

    if let Some(watcher) = watcher {
        watcher.stop().await;
    }
    manager_task.abort();
    if let Err(e) = tokio::fs::remove_file(&config.socket_path).await {
        warn!("Failed to remove {}: {}", config.socket_path.display(), e);
    }

    if let Err(e) = &result {
        error!("RPC server error: {:#}", e);
    }
    info!("Shutting down");
    result
}
