//! Redirect token codec.
//!
//! # Wire format
//!
//! ```text
//! <base_url>[<slug>/]?x=<generation>.<base64url-no-pad(nonce || ciphertext+tag)>
//! ```
//!
//! The generation is a decimal `u32` naming the key the blob was sealed under.
//! The sealed plaintext is the canonical JSON of the payload minus its `slug`.
//! The slug prefix is cosmetic and carries no security meaning.
//!
//! # Module invariants
//!
//! - **Stateless.** All state lives in [`SecretStore`](crate::keys::SecretStore);
//!   encode and decode calls are independent and may run in parallel.
//! - **Opaque failures.** Every decode failure is an [`error::DecodeError`] with one
//!   uniform message; callers facing the network must not reveal the kind.

pub mod codec;
pub mod error;
pub mod slug;

pub use codec::{decode, decode_uri, encode, URL_FIELD};
