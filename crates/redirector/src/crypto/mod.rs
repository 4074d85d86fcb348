//! AES-128-GCM token sealing primitives.
//!
//! This module is intentionally free of HTTP and key-store dependencies.
//! It provides the low-level seal/open operations used by the token codec.
//!
//! # Blob format
//!
//! ```text
//! nonce (12 bytes) || ciphertext || tag (16 bytes)
//! ```

pub mod cipher;

pub use cipher::{EntropyError, EntropySource, SystemEntropy, KEY_LEN};
