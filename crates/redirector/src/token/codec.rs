//! Sealing payloads into redirect URLs and opening them again.

use std::fmt;

use axum::http::Uri;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use common::Payload;
use serde_json::Value;

use super::error::{DecodeError, DecodeErrorKind, EncodeError};
use super::slug;
use crate::crypto::cipher::{self, SealedBlob};
use crate::keys::SecretStore;

/// Query parameter carrying the token.
pub const TOKEN_PARAM: &str = "x";

/// Payload field that must be present when encoding.
pub const URL_FIELD: &str = "url";

/// Payload field consumed by the encoder as a visible path prefix.
pub const SLUG_FIELD: &str = "slug";

/// A parsed token: `<generation>.<base64url(nonce || ciphertext+tag)>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Key generation the blob was sealed under.
    pub generation: u32,
    /// Framed sealed blob, not yet split into nonce and ciphertext.
    pub blob: Vec<u8>,
}

impl Token {
    /// Parse the wire form of a token.
    ///
    /// The blob is only base64-decoded here; its length is checked once the
    /// generation's key has been found.
    pub fn parse(raw: &str) -> Result<Self, DecodeErrorKind> {
        let (generation, blob) = raw
            .split_once('.')
            .ok_or(DecodeErrorKind::Malformed("missing generation separator"))?;
        if generation.is_empty() || !generation.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecodeErrorKind::Malformed("generation is not a decimal number"));
        }
        let generation = generation
            .parse::<u32>()
            .map_err(|_| DecodeErrorKind::Malformed("generation out of range"))?;
        let blob = URL_SAFE_NO_PAD
            .decode(blob)
            .map_err(|_| DecodeErrorKind::Malformed("blob is not unpadded base64url"))?;
        Ok(Self { generation, blob })
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.generation, URL_SAFE_NO_PAD.encode(&self.blob))
    }
}

/// Seal `payload` under the store's active generation and build a redirect URL.
///
/// The `slug` field, if any, is removed before sealing; a non-empty string slug
/// becomes a sanitised path segment. The result has the form
/// `<base_url>[<slug>/]?x=<generation>.<blob>`.
///
/// # Errors
///
/// Returns [`EncodeError::MissingField`] if `payload` has no `url` field,
/// [`EncodeError::Keys`] if the store is empty, and
/// [`EncodeError::Randomness`] if no nonce could be drawn.
pub fn encode(
    store: &SecretStore,
    mut payload: Payload,
    base_url: &str,
) -> Result<String, EncodeError> {
    if !payload.contains_key(URL_FIELD) {
        return Err(EncodeError::MissingField(URL_FIELD));
    }

    let prefix = payload
        .remove(SLUG_FIELD)
        .as_ref()
        .and_then(Value::as_str)
        .map(slug::sanitize)
        .unwrap_or_default();

    let plaintext = serde_json::to_vec(&payload)?;
    let (generation, key) = store.active_key()?;
    let sealed = cipher::seal(&plaintext, key.as_bytes(), store.entropy())?;

    let token = Token {
        generation,
        blob: sealed.to_bytes(),
    };
    let path = if prefix.is_empty() {
        String::new()
    } else {
        format!("{prefix}/")
    };
    Ok(format!("{base_url}{path}?{TOKEN_PARAM}={token}"))
}

/// Decode the token carried by an absolute or path-relative URL string.
///
/// Only the query between the first `?` and any `#` is inspected, so URLs
/// longer than a [`Uri`] can hold still decode.
///
/// # Errors
///
/// Returns an opaque [`DecodeError`] for every failure; see
/// [`DecodeError::kind`] for the cause.
pub fn decode(store: &SecretStore, url: &str) -> Result<Payload, DecodeError> {
    let url = url.split_once('#').map_or(url, |(before, _)| before);
    let query = url.split_once('?').map_or("", |(_, query)| query);
    let raw = token_param(query)?;
    decode_token(store, &raw)
}

/// Decode the token carried by a request URI's query string.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_uri(store: &SecretStore, uri: &Uri) -> Result<Payload, DecodeError> {
    let raw = token_param(uri.query().unwrap_or_default())?;
    decode_token(store, &raw)
}

/// Decode a bare token value (`<generation>.<blob>`).
///
/// # Errors
///
/// See [`decode`].
pub fn decode_token(store: &SecretStore, raw: &str) -> Result<Payload, DecodeError> {
    let token = Token::parse(raw)?;
    let key = store
        .key_for(token.generation)
        .map_err(|_| DecodeErrorKind::UnknownGeneration(token.generation))?;
    let sealed = SealedBlob::from_bytes(&token.blob)
        .map_err(|_| DecodeErrorKind::Malformed("blob shorter than nonce"))?;
    let plaintext =
        cipher::open(&sealed, key.as_bytes()).map_err(|_| DecodeErrorKind::Authentication)?;
    let payload = serde_json::from_slice::<Payload>(&plaintext)
        .map_err(|e| DecodeErrorKind::PayloadFormat(e.to_string()))?;
    Ok(payload)
}

/// First `x` value of a raw query string, which must be non-empty.
fn token_param(query: &str) -> Result<String, DecodeErrorKind> {
    let params: Vec<(String, String)> = serde_urlencoded::from_str(query)
        .map_err(|_| DecodeErrorKind::Malformed("unparseable query string"))?;
    params
        .into_iter()
        .find(|(name, _)| name == TOKEN_PARAM)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
        .ok_or(DecodeErrorKind::MissingToken)
}
