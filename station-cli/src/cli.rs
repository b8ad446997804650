use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use inquire::{Confirm, Password, Text};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::info;

use station_core::{AppContext, Config, Environment, TickOutcome, WeatherSnapshot, http};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "station", version, about = "Netatmo weather station relay")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rotate credentials, fetch on a schedule and serve the latest reading.
    Serve {
        /// Keep state in memory only.
        #[arg(long)]
        ephemeral: bool,
    },

    /// Run a single fetch cycle and print the result.
    Fetch {
        #[arg(long)]
        ephemeral: bool,
    },

    /// Print the cached reading.
    Show,

    /// Interactively set API credentials and station identifiers.
    Configure,

    /// Delete stored tokens; the next start re-seeds from configuration.
    ResetCredentials {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = Config::load(self.config.clone())?;
        init_tracing(config.environment);

        match self.command {
            Command::Serve { ephemeral } => serve(config, ephemeral).await,
            Command::Fetch { ephemeral } => fetch_once(config, ephemeral).await,
            Command::Show => {
                let ctx = AppContext::from_config(config, false).await?;
                match ctx.cache.latest().await? {
                    Some(snapshot) => print_snapshot(&snapshot),
                    None => println!("No reading cached yet."),
                }
                Ok(())
            }
            Command::Configure => configure(self.config),
            Command::ResetCredentials { yes } => {
                let confirmed = yes
                    || Confirm::new("Delete stored tokens? A new refresh token will be required.")
                        .with_default(false)
                        .prompt()?;
                if confirmed {
                    let ctx = AppContext::from_config(config, false).await?;
                    ctx.credentials.reset().await?;
                    println!("Stored credentials removed.");
                }
                Ok(())
            }
        }
    }
}

fn init_tracing(environment: Environment) {
    let default_filter = match environment {
        Environment::Development => "station=debug,station_core=debug",
        Environment::Production => "station=info,station_core=info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

async fn serve(config: Config, ephemeral: bool) -> Result<()> {
    config.validate()?;
    info!("station v{}", env!("CARGO_PKG_VERSION"));
    info!("{}", config.summary());

    let ctx = AppContext::from_config(config, ephemeral).await?;
    ctx.credentials
        .bootstrap()
        .await
        .context("Credential bootstrap failed; refusing to start")?;
    info!("credentials verified ✓");

    let (stop_tx, stop_rx) = watch::channel(false);
    let scheduler = ctx.scheduler.clone();
    let period = ctx.config.fetch_interval();
    let scheduler_task = tokio::spawn(scheduler.run(period, stop_rx));

    let addr = ctx.config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, http::router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    let _ = stop_tx.send(true);
    scheduler_task.await.context("Scheduler task panicked")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn fetch_once(config: Config, ephemeral: bool) -> Result<()> {
    config.validate()?;
    let ctx = AppContext::from_config(config, ephemeral).await?;
    ctx.credentials.bootstrap().await.context("Credential bootstrap failed")?;

    match ctx.scheduler.tick().await {
        TickOutcome::Published(snapshot) => {
            print_snapshot(&snapshot);
            Ok(())
        }
        TickOutcome::Failed(e) => Err(anyhow::anyhow!("Fetch failed: {e}")),
    }
}

/// The config file as saved, without environment overrides, so values from
/// the environment or `.env` are never written back to disk.
fn saved_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = match path {
        Some(p) => p,
        None => Config::config_file_path()?,
    };
    Ok((Config::load_file(&path)?, path))
}

fn configure(path: Option<PathBuf>) -> Result<()> {
    let (mut cfg, path) = saved_config(path)?;

    cfg.client_id = Text::new("Netatmo client id:").with_initial_value(&cfg.client_id).prompt()?;
    let secret = Password::new("Netatmo client secret (leave empty to keep current):")
        .without_confirmation()
        .prompt()?;
    if !secret.trim().is_empty() {
        cfg.client_secret = secret.trim().to_string();
    }
    cfg.device_id = Text::new("Station device id (MAC):")
        .with_initial_value(&cfg.device_id)
        .prompt()?;
    cfg.module_id = Text::new("Outdoor module id (MAC):")
        .with_initial_value(&cfg.module_id)
        .prompt()?;

    let token = Password::new("Initial refresh token (leave empty to keep current):")
        .without_confirmation()
        .prompt()?;
    if !token.trim().is_empty() {
        cfg.initial_refresh_token = Some(token.trim().to_string());
    }

    cfg.validate()?;
    let saved = cfg.save(Some(path))?;
    println!("Configuration saved to {}", saved.display());
    Ok(())
}

fn print_snapshot(snapshot: &WeatherSnapshot) {
    let when = DateTime::<Utc>::from_timestamp_millis(snapshot.timestamp)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| snapshot.timestamp.to_string());

    println!("Temperature: {:.1} °C", snapshot.temperature);
    println!("Pressure:    {:.1} hPa", snapshot.pressure);
    println!("Observed:    {when}");
}
