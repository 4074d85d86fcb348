//! [`SecretStore`]: generation-indexed key material with lock-free reads.

use std::{collections::BTreeMap, fmt, num::NonZeroUsize, sync::Arc};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use thiserror::Error;

use crate::crypto::{EntropyError, EntropySource, SystemEntropy, KEY_LEN};

/// Errors produced by the key layer.
#[derive(Debug, Error)]
pub enum KeyError {
    /// No generation has been created yet.
    #[error("key store not yet initialised")]
    NotInitialised,

    /// `initialize` was called on a store that already holds keys.
    #[error("key store already initialised")]
    AlreadyInitialised,

    /// The requested generation is not held by this store.
    #[error("unknown key generation: {0}")]
    UnknownGeneration(u32),

    /// Key material has an unexpected length.
    #[error("generation {generation} key has invalid length: expected {KEY_LEN} bytes, got {len}")]
    InvalidLength { generation: u32, len: usize },

    /// A snapshot names an active generation it does not contain.
    #[error("active generation {0} has no key")]
    MissingActive(u32),

    /// A snapshot holds generations newer than its active one.
    #[error("active generation {active} is older than generation {newest}")]
    StaleActive { active: u32, newest: u32 },

    /// No further generation number is available.
    #[error("generation counter exhausted")]
    Exhausted,

    /// A replacement snapshot would move the active generation backwards.
    #[error("snapshot regresses active generation from {current} to {proposed}")]
    Regressed { current: u32, proposed: u32 },

    /// A replacement snapshot carries different key material for an existing generation.
    #[error("snapshot changes key material of generation {0}")]
    Conflict(u32),

    /// The secure random source failed; nothing was committed.
    #[error(transparent)]
    Randomness(#[from] EntropyError),
}

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// Cloned out of the store into codec call stacks when needed. The buffer is
/// overwritten with zeroes on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyBytes(Box<[u8; KEY_LEN]>);

impl KeyBytes {
    /// Copy `bytes` into a key buffer, checking the length.
    pub fn from_slice(generation: u32, bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != KEY_LEN {
            return Err(KeyError::InvalidLength {
                generation,
                len: bytes.len(),
            });
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    fn generate(entropy: &dyn EntropySource) -> Result<Self, EntropyError> {
        let mut buf = Box::new([0u8; KEY_LEN]);
        entropy.fill(&mut buf[..])?;
        Ok(Self(buf))
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl Drop for KeyBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        f.write_str("KeyBytes([REDACTED])")
    }
}

/// How many generations a store keeps after rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retention {
    /// Never drop a generation.
    #[default]
    Unbounded,
    /// Keep only the newest `n` generations (the active one included).
    KeepLast(NonZeroUsize),
}

impl Retention {
    /// Build a policy from an optional "keep last" count; `None` means unbounded.
    pub fn from_keep_last(keep: Option<NonZeroUsize>) -> Self {
        keep.map_or(Self::Unbounded, Self::KeepLast)
    }

    fn apply(self, generations: &mut BTreeMap<u32, KeyBytes>) {
        let Self::KeepLast(keep) = self else {
            return;
        };
        while generations.len() > keep.get() {
            generations.pop_first();
        }
    }
}

/// An immutable view of the key set at one point in time.
#[derive(Debug, Clone, Default)]
pub struct KeySnapshot {
    generations: BTreeMap<u32, KeyBytes>,
    active: Option<u32>,
}

impl KeySnapshot {
    /// Build a validated snapshot from raw parts.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidLength`] for any key that is not [`KEY_LEN`]
    /// bytes, [`KeyError::MissingActive`] if `active` has no key (which
    /// includes an empty map), and [`KeyError::StaleActive`] if a newer
    /// generation than `active` is present.
    pub fn from_parts(
        active: u32,
        generations: impl IntoIterator<Item = (u32, Vec<u8>)>,
    ) -> Result<Self, KeyError> {
        let generations = generations
            .into_iter()
            .map(|(gen, bytes)| KeyBytes::from_slice(gen, &bytes).map(|k| (gen, k)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        if !generations.contains_key(&active) {
            return Err(KeyError::MissingActive(active));
        }
        if let Some((&newest, _)) = generations.last_key_value() {
            if newest != active {
                return Err(KeyError::StaleActive { active, newest });
            }
        }
        Ok(Self {
            generations,
            active: Some(active),
        })
    }

    /// Generation used for newly issued tokens, if initialised.
    pub fn active_generation(&self) -> Option<u32> {
        self.active
    }

    /// Number of generations held.
    pub fn len(&self) -> usize {
        self.generations.len()
    }

    /// Returns `true` if no generation has been created.
    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    /// Iterate over `(generation, key)` pairs in ascending generation order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &KeyBytes)> {
        self.generations.iter().map(|(gen, key)| (*gen, key))
    }

    fn key_for(&self, generation: u32) -> Option<&KeyBytes> {
        self.generations.get(&generation)
    }
}

/// Thread-safe store of key generations.
///
/// Reads load the current [`KeySnapshot`] through [`ArcSwap`] and never block.
/// Writers (`initialize`, `rotate`, `replace`) are serialised by a mutex, build
/// a complete new snapshot, and publish it with a single atomic store, so
/// readers never observe a partially inserted generation.
#[derive(Clone)]
pub struct SecretStore {
    inner: Arc<ArcSwap<KeySnapshot>>,
    writer: Arc<Mutex<()>>,
    entropy: Arc<dyn EntropySource>,
    retention: Retention,
}

impl SecretStore {
    /// Create a new, empty [`SecretStore`] backed by the OS random source.
    pub fn new() -> Self {
        Self::from_snapshot(KeySnapshot::default())
    }

    /// Create a store seeded with an existing snapshot (e.g. loaded from disk).
    pub fn from_snapshot(snapshot: KeySnapshot) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(snapshot)),
            writer: Arc::new(Mutex::new(())),
            entropy: Arc::new(SystemEntropy),
            retention: Retention::default(),
        }
    }

    /// Use `entropy` for key generation and token nonces.
    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    /// Apply `retention` on every subsequent rotation.
    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    /// The random source shared by this store and the codec.
    pub fn entropy(&self) -> &dyn EntropySource {
        self.entropy.as_ref()
    }

    /// Current snapshot of the key set.
    pub fn snapshot(&self) -> Arc<KeySnapshot> {
        self.inner.load_full()
    }

    /// Create generation 0 and make it active.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::AlreadyInitialised`] if the store already holds keys
    /// and [`KeyError::Randomness`] if no key could be generated.
    pub fn initialize(&self) -> Result<u32, KeyError> {
        let _guard = self.writer.lock();
        if !self.inner.load().is_empty() {
            return Err(KeyError::AlreadyInitialised);
        }
        let key = KeyBytes::generate(self.entropy())?;
        let mut generations = BTreeMap::new();
        generations.insert(0, key);
        self.inner.store(Arc::new(KeySnapshot {
            generations,
            active: Some(0),
        }));
        Ok(0)
    }

    /// Add generation `active + 1` with a fresh key and make it active.
    ///
    /// Older generations stay decodable unless the retention policy drops them.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::NotInitialised`] on an empty store and
    /// [`KeyError::Randomness`] if no key could be generated; in both cases the
    /// store is left unchanged.
    pub fn rotate(&self) -> Result<u32, KeyError> {
        let _guard = self.writer.lock();
        let current = self.inner.load_full();
        let active = current.active.ok_or(KeyError::NotInitialised)?;
        let next = active.checked_add(1).ok_or(KeyError::Exhausted)?;
        let key = KeyBytes::generate(self.entropy())?;

        let mut generations = current.generations.clone();
        generations.insert(next, key);
        self.retention.apply(&mut generations);

        self.inner.store(Arc::new(KeySnapshot {
            generations,
            active: Some(next),
        }));
        Ok(next)
    }

    /// Atomically swap in a snapshot produced elsewhere (e.g. a reloaded config file).
    ///
    /// Returns `true` if the published snapshot changed.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Regressed`] if the proposed active generation is older
    /// than the current one and [`KeyError::Conflict`] if a generation present in
    /// both snapshots has different key material. The current snapshot is kept.
    pub fn replace(&self, proposed: KeySnapshot) -> Result<bool, KeyError> {
        let _guard = self.writer.lock();
        let current = self.inner.load_full();

        if let (Some(current_active), Some(proposed_active)) = (current.active, proposed.active) {
            if proposed_active < current_active {
                return Err(KeyError::Regressed {
                    current: current_active,
                    proposed: proposed_active,
                });
            }
        }
        if proposed.is_empty() && !current.is_empty() {
            return Err(KeyError::NotInitialised);
        }
        for (gen, key) in proposed.iter() {
            if current.key_for(gen).is_some_and(|existing| existing != key) {
                return Err(KeyError::Conflict(gen));
            }
        }

        let unchanged = current.active == proposed.active
            && current.generations.keys().eq(proposed.generations.keys());
        if unchanged {
            return Ok(false);
        }
        self.inner.store(Arc::new(proposed));
        Ok(true)
    }

    /// Key for `generation`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::UnknownGeneration`] if the store does not hold it.
    pub fn key_for(&self, generation: u32) -> Result<KeyBytes, KeyError> {
        self.inner
            .load()
            .key_for(generation)
            .cloned()
            .ok_or(KeyError::UnknownGeneration(generation))
    }

    /// The active generation and its key.
    ///
    /// Both are read from the same snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::NotInitialised`] on an empty store.
    pub fn active_key(&self) -> Result<(u32, KeyBytes), KeyError> {
        let snapshot = self.inner.load();
        let active = snapshot.active.ok_or(KeyError::NotInitialised)?;
        let key = snapshot
            .key_for(active)
            .cloned()
            .ok_or(KeyError::MissingActive(active))?;
        Ok((active, key))
    }
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.inner.load();
        f.debug_struct("SecretStore")
            .field("active", &snapshot.active)
            .field("generations", &snapshot.len())
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::cipher::MockEntropySource;

    fn failing_entropy() -> Arc<dyn EntropySource> {
        let mut rng = MockEntropySource::new();
        rng.expect_fill()
            .returning(|_| Err(EntropyError("no entropy".into())));
        Arc::new(rng)
    }

    #[test]
    fn initially_not_ready() {
        let store = SecretStore::new();
        assert!(store.snapshot().is_empty());
        assert!(matches!(store.active_key(), Err(KeyError::NotInitialised)));
        assert!(matches!(store.rotate(), Err(KeyError::NotInitialised)));
    }

    #[test]
    fn initialize_creates_generation_zero() {
        let store = SecretStore::new();
        assert_eq!(store.initialize().unwrap(), 0);
        let (gen, key) = store.active_key().unwrap();
        assert_eq!(gen, 0);
        assert_eq!(key.as_bytes().len(), KEY_LEN);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn initialize_twice_is_rejected() {
        let store = SecretStore::new();
        store.initialize().unwrap();
        let (_, before) = store.active_key().unwrap();
        assert!(matches!(
            store.initialize(),
            Err(KeyError::AlreadyInitialised)
        ));
        assert_eq!(store.active_key().unwrap().1, before);
    }

    #[test]
    fn rotate_advances_and_keeps_old_keys() {
        let store = SecretStore::new();
        store.initialize().unwrap();
        let (_, key0) = store.active_key().unwrap();

        assert_eq!(store.rotate().unwrap(), 1);
        assert_eq!(store.rotate().unwrap(), 2);

        let (active, key2) = store.active_key().unwrap();
        assert_eq!(active, 2);
        assert_ne!(key2, key0);
        assert_eq!(store.key_for(0).unwrap(), key0);
        assert!(store.key_for(1).is_ok());
        assert_eq!(store.snapshot().len(), 3);
    }

    #[test]
    fn unknown_generation_is_reported() {
        let store = SecretStore::new();
        store.initialize().unwrap();
        assert!(matches!(
            store.key_for(7),
            Err(KeyError::UnknownGeneration(7))
        ));
    }

    #[test]
    fn randomness_failure_commits_nothing() {
        let store = SecretStore::new().with_entropy(failing_entropy());
        assert!(matches!(store.initialize(), Err(KeyError::Randomness(_))));
        assert!(store.snapshot().is_empty());

        let seeded = SecretStore::from_snapshot(
            KeySnapshot::from_parts(0, [(0, vec![1u8; KEY_LEN])]).unwrap(),
        )
        .with_entropy(failing_entropy());
        assert!(matches!(seeded.rotate(), Err(KeyError::Randomness(_))));
        assert_eq!(seeded.snapshot().active_generation(), Some(0));
        assert_eq!(seeded.snapshot().len(), 1);
    }

    #[test]
    fn retention_keeps_newest_generations() {
        let keep = NonZeroUsize::new(2).unwrap();
        let store = SecretStore::new().with_retention(Retention::KeepLast(keep));
        store.initialize().unwrap();
        for _ in 0..4 {
            store.rotate().unwrap();
        }
        let gens: Vec<u32> = store.snapshot().iter().map(|(g, _)| g).collect();
        assert_eq!(gens, vec![3, 4]);
        assert!(matches!(
            store.key_for(0),
            Err(KeyError::UnknownGeneration(0))
        ));
    }

    #[test]
    fn retention_from_keep_last() {
        assert_eq!(Retention::from_keep_last(None), Retention::Unbounded);
        let one = NonZeroUsize::new(1).unwrap();
        assert_eq!(
            Retention::from_keep_last(Some(one)),
            Retention::KeepLast(one)
        );
    }

    #[test]
    fn from_parts_validates() {
        assert!(matches!(
            KeySnapshot::from_parts(0, Vec::new()),
            Err(KeyError::MissingActive(0))
        ));
        assert!(matches!(
            KeySnapshot::from_parts(1, [(0, vec![0u8; KEY_LEN])]),
            Err(KeyError::MissingActive(1))
        ));
        assert!(matches!(
            KeySnapshot::from_parts(0, [(0, vec![0u8; KEY_LEN]), (1, vec![1u8; KEY_LEN])]),
            Err(KeyError::StaleActive { active: 0, newest: 1 })
        ));
        assert!(matches!(
            KeySnapshot::from_parts(0, [(0, vec![0u8; 32])]),
            Err(KeyError::InvalidLength { generation: 0, len: 32 })
        ));
        let snap = KeySnapshot::from_parts(1, [(0, vec![0u8; KEY_LEN]), (1, vec![1u8; KEY_LEN])])
            .unwrap();
        assert_eq!(snap.active_generation(), Some(1));
        assert_eq!(snap.len(), 2);
    }

    #[test]
    fn replace_publishes_newer_snapshot() {
        let store = SecretStore::from_snapshot(
            KeySnapshot::from_parts(0, [(0, vec![1u8; KEY_LEN])]).unwrap(),
        );
        let newer =
            KeySnapshot::from_parts(1, [(0, vec![1u8; KEY_LEN]), (1, vec![2u8; KEY_LEN])])
                .unwrap();
        assert!(store.replace(newer.clone()).unwrap());
        assert_eq!(store.active_key().unwrap().0, 1);
        // Same content again is a no-op.
        assert!(!store.replace(newer).unwrap());
    }

    #[test]
    fn replace_rejects_regression_and_conflict() {
        let store = SecretStore::from_snapshot(
            KeySnapshot::from_parts(1, [(0, vec![1u8; KEY_LEN]), (1, vec![2u8; KEY_LEN])])
                .unwrap(),
        );
        let older = KeySnapshot::from_parts(0, [(0, vec![1u8; KEY_LEN])]).unwrap();
        assert!(matches!(
            store.replace(older),
            Err(KeyError::Regressed { current: 1, proposed: 0 })
        ));

        let forged =
            KeySnapshot::from_parts(1, [(0, vec![9u8; KEY_LEN]), (1, vec![2u8; KEY_LEN])])
                .unwrap();
        assert!(matches!(store.replace(forged), Err(KeyError::Conflict(0))));

        assert!(matches!(
            store.replace(KeySnapshot::default()),
            Err(KeyError::NotInitialised)
        ));
        assert_eq!(store.key_for(0).unwrap().as_bytes(), &[1u8; KEY_LEN]);
    }

    #[test]
    fn readers_see_consistent_snapshots_during_rotation() {
        let store = SecretStore::new();
        store.initialize().unwrap();
        std::thread::scope(|s| {
            let writer = store.clone();
            s.spawn(move || {
                for _ in 0..50 {
                    writer.rotate().unwrap();
                }
            });
            for _ in 0..4 {
                let reader = store.clone();
                s.spawn(move || {
                    for _ in 0..200 {
                        let (gen, key) = reader.active_key().unwrap();
                        assert_eq!(reader.key_for(gen).unwrap(), key);
                    }
                });
            }
        });
        assert_eq!(store.active_key().unwrap().0, 50);
        assert_eq!(store.snapshot().len(), 51);
    }

    #[test]
    fn key_bytes_redacted_in_debug() {
        let key = KeyBytes::from_slice(0, &[0xFF; KEY_LEN]).unwrap();
        assert!(format!("{key:?}").contains("REDACTED"));
        let snapshot = KeySnapshot::from_parts(0, [(0, vec![0xFF; KEY_LEN])]).unwrap();
        assert!(!format!("{snapshot:?}").contains("255"));
    }
}
