//! `redirector` binary entry point.
//!
//! Startup sequence:
//! 1. Parse the command line.
//! 2. Load and validate runtime [`Settings`] from environment variables.
//! 3. Initialise telemetry (JSON logs on stderr, optional OTLP export).
//! 4. Load the config file (creating it on first use) and seed the key store.
//! 5. Run the requested command: `init`, `rotate`, `create`, `parse`, or
//!    `serve`. Serving also spawns the key reload task.

mod cli;
mod config;
mod crypto;
mod keys;
mod server;
mod telemetry;
mod token;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use cli::{Cli, Command};
use config::{ConfigFile, Settings};
use keys::Retention;
use server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // -----------------------------------------------------------------------
    // 1. Settings
    // -----------------------------------------------------------------------
    let settings = Settings::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: settings invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(&settings.log_level, settings.otlp_endpoint())?;

    // -----------------------------------------------------------------------
    // 3. Command
    // -----------------------------------------------------------------------
    let retention = settings.retention();
    match cli.command {
        Command::Init => init(&cli.config, retention)?,
        Command::Rotate => rotate(&cli.config, retention)?,
        Command::Create { fields } => create(&cli.config, retention, &fields)?,
        Command::Parse { url } => parse(&cli.config, retention, &url)?,
        Command::Serve => serve(cli.config, &settings).await?,
    }

    Ok(())
}

/// Write a fresh config file, discarding any keys already at `path`.
fn init(path: &Path, retention: Retention) -> Result<()> {
    if path.exists() {
        warn!(
            path = %path.display(),
            "replacing existing config file; links issued under it stop working"
        );
    }
    ConfigFile::init(path, retention)?;
    Ok(())
}

fn rotate(path: &Path, retention: Retention) -> Result<()> {
    let (mut file, store) = ConfigFile::load_or_init(path, retention)?;
    let generation = store.rotate().context("failed to rotate key")?;
    file.record(&store.snapshot());
    file.save(path)?;
    info!(
        generation,
        generations = file.secrets.len(),
        "key rotated"
    );
    Ok(())
}

fn create(path: &Path, retention: Retention, fields: &[String]) -> Result<()> {
    let (file, store) = ConfigFile::load_or_init(path, retention)?;
    let payload = if fields.is_empty() {
        cli::payload_from_reader(std::io::stdin().lock())?
    } else {
        cli::payload_from_args(fields)
    };
    let url = token::encode(&store, payload, &file.base_url).context("failed to create url")?;
    println!("{url}");
    Ok(())
}

fn parse(path: &Path, retention: Retention, url: &str) -> Result<()> {
    let (_, store) = ConfigFile::load_or_init(path, retention)?;
    // The operator is trusted, so the precise cause is reported here.
    let payload = token::decode(&store, url)
        .map_err(|e| anyhow!("failed to decode url: {}", e.kind()))?;
    let pretty = serde_json::to_string_pretty(&payload).context("failed to render payload")?;
    println!("{pretty}");
    Ok(())
}

async fn serve(path: PathBuf, settings: &Settings) -> Result<()> {
    let (file, store) = ConfigFile::load_or_init(&path, settings.retention())?;
    let snapshot = store.snapshot();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        active_generation = ?snapshot.active_generation(),
        generations = snapshot.len(),
        "redirector starting"
    );

    if let Some(interval) = settings.key_reload_interval() {
        let _key_reload = keys::reload_task(path, interval, store.clone());
    }

    let router = server::router::build(AppState::new(store), settings.request_timeout());

    let listener = tokio::net::TcpListener::bind(&file.listen)
        .await
        .with_context(|| format!("failed to bind {}", file.listen))?;
    info!(addr = %file.listen, base_url = %file.base_url, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            warn!(error = %e, "failed to listen for ctrl-c; running until killed");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_replaces_existing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redirector.json");

        init(&path, Retention::Unbounded).unwrap();
        rotate(&path, Retention::Unbounded).unwrap();
        let before = ConfigFile::load(&path).unwrap();
        assert_eq!(before.version, 1);

        init(&path, Retention::Unbounded).unwrap();
        let after = ConfigFile::load(&path).unwrap();
        assert_eq!(after.version, 0);
        assert_eq!(after.secrets.len(), 1);
        assert_ne!(after.secrets.get(&0), before.secrets.get(&0));
    }

    #[test]
    fn rotate_creates_missing_file_then_advances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redirector.json");

        rotate(&path, Retention::Unbounded).unwrap();
        rotate(&path, Retention::Unbounded).unwrap();
        let file = ConfigFile::load(&path).unwrap();
        assert_eq!(file.version, 2);
        assert_eq!(file.secrets.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
