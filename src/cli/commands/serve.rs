use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::{info, warn};

use crate::cli::load_config;
use crate::client::{DaemonClient, stop_daemon};
use crate::error::DaemonError;
use crate::models::Config;
use crate::server::run_daemon;

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[command(subcommand)]
    pub command: Option<ServeCommand>,

    /// Set on the process spawned by the client; serves in this process.
    #[arg(long, hide = true)]
    pub daemon: bool,

    #[arg(long, help = "Run in the foreground instead of detaching")]
    pub foreground: bool,
}

#[derive(Debug, Subcommand)]
pub enum ServeCommand {
    /// Stop the running daemon
    Stop,
    /// Stop, then start the daemon
    Restart,
}

pub async fn handle_serve(args: ServeArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    if args.daemon || args.foreground {
        if args.foreground {
            info!(socket = %config.socket_path().display(), "serving in the foreground");
        }
        return Ok(run_daemon(config).await?);
    }

    let client = DaemonClient::new(&config).with_config_file(config_path.map(Path::to_path_buf));
    match args.command {
        None => start(&client),
        Some(ServeCommand::Stop) => stop(&config),
        Some(ServeCommand::Restart) => {
            if let Err(e) = stop(&config) {
                warn!(error = %e, "could not stop the running daemon");
            }
            // Give the old process time to release the socket.
            tokio::time::sleep(Duration::from_millis(500)).await;
            start(&client)
        }
    }
}

fn start(client: &DaemonClient) -> Result<()> {
    if client.is_running() {
        println!("Daemon is already running");
        return Ok(());
    }

    client.spawn_daemon().context("failed to start daemon")?;
    println!("Daemon started");
    println!("Socket: {}", client.socket_path().display());
    println!("Log:    {}", client.log_path().display());
    Ok(())
}

fn stop(config: &Config) -> Result<()> {
    match stop_daemon(config) {
        Ok(()) => println!("Daemon stopped"),
        Err(DaemonError::NotRunning) => println!("Daemon is not running"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
