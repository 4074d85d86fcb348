//! AES-128-GCM sealing and opening of redirect token blobs.
//!
//! **Algorithm choice:** AES-GCM with a 128-bit key, no associated data. A
//! fresh random 96-bit nonce is drawn for every seal, so sealing the same
//! payload twice yields different blobs. Blobs are interchangeable with any
//! other AES-128-GCM implementation using the same framing.
//!
//! The randomness used for nonces and keys goes through [`EntropySource`], so
//! an unavailable platform RNG surfaces as an error instead of a panic.

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes128Gcm, Nonce,
};
use thiserror::Error;

/// Byte length of an AES-128 key (16 bytes = 128 bits).
pub const KEY_LEN: usize = 16;

/// Byte length of an AES-GCM nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// The platform's secure random source could not supply bytes.
#[derive(Debug, Error)]
#[error("secure random source unavailable: {0}")]
pub struct EntropyError(pub String);

/// Source of cryptographically secure random bytes.
#[cfg_attr(test, mockall::automock)]
pub trait EntropySource: Send + Sync {
    /// Fill `buf` entirely with random bytes.
    fn fill(&self, buf: &mut [u8]) -> Result<(), EntropyError>;
}

/// [`EntropySource`] backed by the operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEntropy;

impl EntropySource for SystemEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), EntropyError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| EntropyError(e.to_string()))
    }
}

/// A sealed payload: nonce plus ciphertext with the tag appended.
///
/// The byte representation is `nonce || ciphertext+tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlob {
    /// Raw nonce bytes.
    pub nonce: [u8; NONCE_LEN],
    /// Raw ciphertext + authentication tag bytes.
    pub ciphertext: Vec<u8>,
}

impl SealedBlob {
    /// Concatenate nonce and ciphertext into the framed byte form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Split a framed byte string back into nonce and ciphertext.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::TooShort`] if `bytes` cannot even hold a nonce.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() < NONCE_LEN {
            return Err(CipherError::TooShort(bytes.len()));
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);
        Ok(Self {
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key is the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid key length: expected {KEY_LEN} bytes")]
    InvalidKeyLength,

    /// AES-GCM encryption failed, or decryption failed authentication.
    #[error("aead operation failed")]
    AeadFailure,

    /// The framed blob is shorter than a nonce.
    #[error("sealed blob too short: {0} bytes")]
    TooShort(usize),

    /// No nonce could be drawn.
    #[error(transparent)]
    Randomness(#[from] EntropyError),
}

/// Seal `plaintext` under `key` with a freshly drawn nonce and no associated data.
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes,
/// [`CipherError::Randomness`] if no nonce could be drawn, and
/// [`CipherError::AeadFailure`] on an internal AEAD error.
pub fn seal(
    plaintext: &[u8],
    key: &[u8],
    entropy: &dyn EntropySource,
) -> Result<SealedBlob, CipherError> {
    let cipher = build_cipher(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    entropy.fill(&mut nonce_bytes)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CipherError::AeadFailure)?;

    Ok(SealedBlob {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Open a [`SealedBlob`] back to plaintext bytes.
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes.
/// Returns [`CipherError::AeadFailure`] if authentication fails (wrong key,
/// tampered or truncated data).
pub fn open(blob: &SealedBlob, key: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = build_cipher(key)?;
    let nonce = Nonce::from_slice(&blob.nonce);
    cipher
        .decrypt(nonce, blob.ciphertext.as_ref())
        .map_err(|_| CipherError::AeadFailure)
}

fn build_cipher(key: &[u8]) -> Result<Aes128Gcm, CipherError> {
    if key.len() != KEY_LEN {
        return Err(CipherError::InvalidKeyLength);
    }
    Aes128Gcm::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength)
}
