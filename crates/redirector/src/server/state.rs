//! Shared application state injected into every Axum handler.

use crate::keys::SecretStore;

/// Application state shared across all request handlers.
///
/// [`SecretStore`] is `Arc`-backed, so Axum can clone the state for each
/// request without copying key material.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Key generations used to open inbound tokens.
    pub store: SecretStore,
}

impl AppState {
    /// Create a new [`AppState`] around `store`.
    pub fn new(store: SecretStore) -> Self {
        Self { store }
    }
}

impl Default for AppState {
    /// Creates a default [`AppState`] with an empty store, suitable for tests.
    fn default() -> Self {
        Self::new(SecretStore::new())
    }
}
