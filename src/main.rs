//! Serial-to-network forwarding daemon
//!
//! Forwards byte streams from one or more serial ports to remote network
//! endpoints, tolerating intermittent failure of both the serial side and
//! the network side without losing data. See `forwarder-daemon --help`.

use clap::Parser;
use serial_net_forwarder::cli::Cli;
use serial_net_forwarder::config::Config;
use serial_net_forwarder::error::{self, Result};
use serial_net_forwarder::logging;
use serial_net_forwarder::supervisor::Supervisor;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let rt = tokio::runtime::Runtime::new().map_err(|e| error::ForwarderError::Io {
        path: std::path::PathBuf::from("tokio runtime"),
        source: e,
    })?;

    if cli.status {
        return rt.block_on(run_status(&cli));
    }

    rt.block_on(run(&cli))
}

async fn run_status(cli: &Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    println!("configuration: {}", cli.config.display());
    for port in &config.ports {
        let variant = if port.http_url.is_some() {
            "http-relay"
        } else {
            "direct-tcp"
        };
        println!(
            "  [{}] {} @ {} baud -> {} ({})",
            port.name, port.serial_port, port.serial_baudrate, port.tcp_host, variant
        );
    }
    Ok(())
}

async fn run(cli: &Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    let buffer_dir = cli
        .config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));

    let mut supervisor = Supervisor::new(config, buffer_dir).await?;
    supervisor.start().await?;
    info!("supervisor started");

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping engines");

    supervisor.stop().await;
    info!("supervisor stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let notify = Arc::new(Notify::new());

    #[cfg(unix)]
    {
        let notify = notify.clone();
        tokio::spawn(async move {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
            notify.notify_one();
        });
    }

    #[cfg(not(unix))]
    {
        let notify = notify.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            notify.notify_one();
        });
    }

    notify.notified().await;
}
