//! Encode and decode errors.
//!
//! Decode failures are opaque: every [`DecodeError`] displays the same message
//! and maps to [`ServiceError::NotFound`]. The precise cause is kept in
//! [`DecodeErrorKind`] for logs and operator tooling only.

use common::ServiceError;
use thiserror::Error;

use crate::crypto::cipher::CipherError;
use crate::crypto::EntropyError;
use crate::keys::KeyError;

/// Why a token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    /// The URL carries no non-empty token parameter.
    #[error("no token parameter")]
    MissingToken,

    /// The token or URL does not have the expected structure.
    #[error("malformed token: {0}")]
    Malformed(&'static str),

    /// The token names a generation this store does not hold.
    #[error("unknown key generation {0}")]
    UnknownGeneration(u32),

    /// AEAD verification failed: tampered, truncated, or sealed under another key.
    #[error("authentication failed")]
    Authentication,

    /// The plaintext is authentic but not a JSON object.
    #[error("payload is not a JSON object: {0}")]
    PayloadFormat(String),
}

/// A token was rejected.
#[derive(Debug, Error)]
#[error("invalid redirect token")]
pub struct DecodeError {
    kind: DecodeErrorKind,
}

impl DecodeError {
    /// The underlying cause, for diagnostics only.
    pub fn kind(&self) -> &DecodeErrorKind {
        &self.kind
    }
}

impl From<DecodeErrorKind> for DecodeError {
    fn from(kind: DecodeErrorKind) -> Self {
        Self { kind }
    }
}

impl From<DecodeError> for ServiceError {
    fn from(_: DecodeError) -> Self {
        ServiceError::NotFound
    }
}

/// Errors produced while issuing a token.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A required payload field is absent.
    #[error("a '{0}' field must be provided")]
    MissingField(&'static str),

    /// The key store cannot supply an active key.
    #[error("key store: {0}")]
    Keys(#[from] KeyError),

    /// No nonce could be drawn.
    #[error(transparent)]
    Randomness(#[from] EntropyError),

    /// The payload could not be serialised.
    #[error("failed to serialise payload: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Sealing failed for a reason other than randomness.
    #[error("failed to seal payload: {0}")]
    Seal(CipherError),
}

impl From<CipherError> for EncodeError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::Randomness(e) => EncodeError::Randomness(e),
            other => EncodeError::Seal(other),
        }
    }
}
