//! Command handlers.

use tracing::{info, warn};

use fleetwatch_config::Config;
use fleetwatch_core::Monitor;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, RunArgs};
use crate::error::CliError;

// ── run ──────────────────────────────────────────────────────────────

/// Start the fleet, serve dashboards, and shut down cleanly on Ctrl-C.
pub async fn run(args: &RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut config = load(global)?;
    if let Some(listen) = args.listen {
        config.server.listen = listen.to_string();
    }

    let monitor = Monitor::new(config.to_monitor_config()?)?;
    let listener = monitor.bind().await?;
    info!(
        addr = %listener.local_addr()?,
        ranges = config.ranges.len(),
        "fleetwatch listening"
    );

    let started = monitor.start().await;
    info!(devices = started, "watchers started");

    tokio::spawn({
        let monitor = monitor.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C");
                return;
            }
            info!("interrupt received");
            monitor.shutdown().await;
        }
    });

    monitor.serve(listener).await?;
    monitor.shutdown().await;
    Ok(())
}

// ── config ───────────────────────────────────────────────────────────

pub fn config(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            print!("{}", load(global)?.to_toml()?);
        }
        ConfigCommand::Check => {
            let config = load(global)?;
            config.to_monitor_config()?;
            println!(
                "configuration OK: {} devices in {} ranges, serving on {}",
                config.device_count(),
                config.ranges.len(),
                config.server.listen
            );
        }
        ConfigCommand::Path => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(fleetwatch_config::config_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(fleetwatch_config::load_config(global.config.as_deref())?)
}
