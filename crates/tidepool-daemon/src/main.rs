//! tidepool controller daemon.
//!
//! Loads the JSON configuration named by `$TIDEPOOL_CONFIG`, starts the
//! hardware control service and its RPC endpoint, then steps the scheduler
//! every 30 seconds until interrupted. Log filtering follows `RUST_LOG`
//! (default `info`).

mod notify;

use std::{env, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::Local;
use tidepool_core::{config::DaemonConfig, constants::SCHEDULER_TICK};
use tidepool_hardware::HardwareControlService;
use tidepool_network::{RpcServer, RpcServerConfig};
use tidepool_scheduler::Scheduler;
use tokio::{
    signal::unix::{SignalKind, signal},
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::notify::Notifier;

const CONFIG_ENV: &str = "TIDEPOOL_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let path = env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .with_context(|| format!("{CONFIG_ENV} must name the configuration file"))?;
    let config = DaemonConfig::from_file(&path)
        .with_context(|| format!("Loading {}", path.display()))?;
    info!(config = %path.display(), mock = config.hardware.use_mock_hw, "Configuration loaded");

    let service = Arc::new(
        HardwareControlService::from_config(&config.hardware)
            .await
            .context("Starting hardware control service")?,
    );

    let server = RpcServer::bind(RpcServerConfig::try_from(&config.server)?, Arc::clone(&service))
        .await
        .context("Binding RPC server")?;
    info!(addr = %server.local_addr()?, "RPC server listening");
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "RPC server stopped");
        }
    });

    let stop = CancellationToken::new();
    let mut scheduler = Scheduler::from_config(&config, Arc::clone(&service), stop.clone())
        .context("Building schedule")?;

    let notifier = Notifier::from_env();
    notifier.notify("READY=1").await;

    let mut tick = tokio::time::interval(SCHEDULER_TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                scheduler.update(Local::now().naive_local()).await;
                notifier.notify("WATCHDOG=1").await;
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Interrupted");
                break;
            }
            _ = sigterm.recv() => {
                info!("Terminated");
                break;
            }
        }
    }

    notifier.notify("STOPPING=1").await;
    stop.cancel();
    service.stop_stepper();
    server_task.abort();
    info!("Shut down");
    Ok(())
}
