//! Key generations: storage, rotation, and hot reload from the config file.
//!
//! # Lifecycle
//!
//! 1. A [`SecretStore`] is seeded from the config file at startup (or
//!    initialised with generation 0 if the file does not exist yet).
//! 2. `rotate` is an operator action performed by the CLI, which saves the new
//!    snapshot back to the config file.
//! 3. A running server picks the new generation up through [`reload_task`],
//!    which re-reads the file and atomically swaps the snapshot in.
//!
//! # Security invariants
//!
//! - Key material is never logged or included in traces.
//! - Once published, a generation's key never changes; [`SecretStore::replace`]
//!   refuses snapshots that would alter or regress it.

pub mod store;

pub use store::{KeyError, KeySnapshot, Retention, SecretStore};

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;

/// Re-read the config file at `path` and publish its key set into `store`.
///
/// Returns `true` if the store's snapshot changed.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if its key set is
/// invalid or incompatible with the keys already published.
pub fn reload_from_file(path: &Path, store: &SecretStore) -> Result<bool> {
    let file = ConfigFile::load(path)?;
    let snapshot = file
        .key_snapshot()
        .with_context(|| format!("invalid key set in {}", path.display()))?;
    let changed = store
        .replace(snapshot)
        .context("reloaded key set rejected")?;
    Ok(changed)
}

/// [`reload_from_file`] on the blocking thread pool, for use from async code.
///
/// # Errors
///
/// As [`reload_from_file`], or if the blocking task panicked.
pub async fn reload(path: PathBuf, store: SecretStore) -> Result<bool> {
    tokio::task::spawn_blocking(move || reload_from_file(&path, &store))
        .await
        .context("key reload task failed")?
}

/// Spawn a background task that periodically reloads keys from the config file.
///
/// The first reload fires after one full interval (the store is assumed to have
/// been seeded at startup). On failure the previous snapshot is retained and a
/// warning is emitted.
pub fn reload_task(
    path: PathBuf,
    interval: Duration,
    store: SecretStore,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        // First tick fires immediately; skip it so we don't reload twice at startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match reload(path.clone(), store.clone()).await {
                Ok(true) => {
                    let snapshot = store.snapshot();
                    info!(
                        active_generation = ?snapshot.active_generation(),
                        generations = snapshot.len(),
                        "key set reloaded"
                    );
                }
                Ok(false) => debug!("key set unchanged"),
                Err(e) => warn!(error = %format!("{e:#}"), "key reload failed; retaining previous keys"),
            }
        }
    })
}
