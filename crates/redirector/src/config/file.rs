//! Persistent JSON configuration file: key generations, listen address, base URL.
//!
//! ```json
//! {
//!   "Version": 1,
//!   "Secrets": { "0": "<base64>", "1": "<base64>" },
//!   "Listen": "127.0.0.1:3000",
//!   "BaseURL": "http://127.0.0.1:3000/"
//! }
//! ```
//!
//! `Version` is the active generation. Keys are standard padded base64.

use std::{
    collections::BTreeMap,
    fmt, fs,
    io::{self, Write},
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::keys::{KeyError, KeySnapshot, Retention, SecretStore};

/// Listen address written into a freshly initialised file.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";

/// Base URL written into a freshly initialised file.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000/";

/// On-disk configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Active key generation.
    #[serde(rename = "Version")]
    pub version: u32,

    /// Key material by generation.
    #[serde(rename = "Secrets", with = "secrets_base64")]
    pub secrets: BTreeMap<u32, Vec<u8>>,

    /// Socket address the redirect server binds.
    #[serde(rename = "Listen")]
    pub listen: String,

    /// Prefix of every issued URL, normally ending in `/`.
    #[serde(rename = "BaseURL")]
    pub base_url: String,
}

impl fmt::Debug for ConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigFile")
            .field("version", &self.version)
            .field("secrets", &format_args!("[{} REDACTED]", self.secrets.len()))
            .field("listen", &self.listen)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ConfigFile {
    /// A file with default listen address and base URL holding `snapshot`.
    pub fn new(snapshot: &KeySnapshot) -> Self {
        let mut file = Self {
            version: 0,
            secrets: BTreeMap::new(),
            listen: DEFAULT_LISTEN.into(),
            base_url: DEFAULT_BASE_URL.into(),
        };
        file.record(snapshot);
        file
    }

    /// Read and parse the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid config JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self> {
        serde_json::from_str(text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Write the file as indented JSON.
    ///
    /// The content goes to a uniquely named, owner-only temporary file in the
    /// same directory, which is then renamed over `path`. Readers see either
    /// the old or the new file, and concurrent writers never share a temp file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or any filesystem step fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut text =
            serde_json::to_string_pretty(self).context("failed to serialise config file")?;
        text.push('\n');

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        tmp.write_all(text.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .with_context(|| format!("failed to write {}", tmp.path().display()))?;
        tmp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("failed to replace config file {}", path.display()))?;
        Ok(())
    }

    /// Create a fresh store with generation 0, write a default file for it, and
    /// return both. An existing file at `path` is overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation or saving fails.
    pub fn init(path: &Path, retention: Retention) -> Result<(Self, SecretStore)> {
        let store = SecretStore::new().with_retention(retention);
        store.initialize().context("failed to create initial key")?;
        let file = Self::new(&store.snapshot());
        file.save(path)?;
        info!(path = %path.display(), "initialised config file");
        Ok((file, store))
    }

    /// Load the file at `path`, or [`init`](Self::init) one if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or validated, or
    /// if initialising a new one fails.
    pub fn load_or_init(path: &Path, retention: Retention) -> Result<(Self, SecretStore)> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let file = Self::parse(&text, path)?;
                let store = file
                    .secret_store(retention)
                    .with_context(|| format!("invalid key set in {}", path.display()))?;
                Ok((file, store))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::init(path, retention),
            Err(e) => Err(e)
                .with_context(|| format!("failed to read config file {}", path.display())),
        }
    }

    /// Validated key snapshot for this file's secrets.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] if the key set is empty, a key has the wrong
    /// length, or `Version` is not the newest generation present.
    pub fn key_snapshot(&self) -> Result<KeySnapshot, KeyError> {
        KeySnapshot::from_parts(
            self.version,
            self.secrets.iter().map(|(gen, key)| (*gen, key.clone())),
        )
    }

    /// A store seeded from this file's secrets.
    ///
    /// # Errors
    ///
    /// See [`key_snapshot`](Self::key_snapshot).
    pub fn secret_store(&self, retention: Retention) -> Result<SecretStore, KeyError> {
        Ok(SecretStore::from_snapshot(self.key_snapshot()?).with_retention(retention))
    }

    /// Replace this file's key set with `snapshot`.
    pub fn record(&mut self, snapshot: &KeySnapshot) {
        self.version = snapshot.active_generation().unwrap_or_default();
        self.secrets = snapshot
            .iter()
            .map(|(gen, key)| (gen, key.as_bytes().to_vec()))
            .collect();
    }
}

mod secrets_base64 {
    use std::collections::BTreeMap;

    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        secrets: &BTreeMap<u32, Vec<u8>>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        ser.collect_map(secrets.iter().map(|(gen, key)| (gen, STANDARD.encode(key))))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<BTreeMap<u32, Vec<u8>>, D::Error> {
        BTreeMap::<u32, String>::deserialize(de)?
            .into_iter()
            .map(|(gen, encoded)| {
                STANDARD
                    .decode(encoded.as_bytes())
                    .map(|key| (gen, key))
                    .map_err(|e| D::Error::custom(format!("secret {gen}: {e}")))
            })
            .collect()
    }
}
