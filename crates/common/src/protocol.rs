//! Payload and response types exchanged between components.
//!
//! Response bodies are serialised as JSON by the HTTP redirector.

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// The key/value mapping sealed into a redirect token.
///
/// Values may be any JSON value. By convention the `url` field carries the
/// redirect destination and an optional `slug` field names a visible path
/// prefix; neither is interpreted here.
///
/// Backed by `serde_json`'s sorted map, so serialisation is canonical: equal
/// payloads always produce identical bytes.
pub type Payload = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx, non-3xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"not_found"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        match err {
            ServiceError::NotFound => {
                Self::new(err.code(), "the requested resource does not exist")
            }
            ServiceError::Unavailable(_) => Self::new(err.code(), err.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Whether the key store holds at least one generation.
    pub keys_ready: bool,
    /// Generation used for newly issued tokens, if any.
    pub active_generation: Option<u32>,
    /// Number of key generations currently accepted for decoding.
    pub generations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_serialises_with_sorted_keys() {
        let mut p = Payload::new();
        p.insert("url".into(), json!("https://example.com"));
        p.insert("campaign".into(), json!("spring"));
        p.insert("id".into(), json!(7));
        let s = serde_json::to_string(&p).unwrap();
        assert_eq!(s, r#"{"campaign":"spring","id":7,"url":"https://example.com"}"#);
    }

    #[test]
    fn error_response_new() {
        let e = ErrorResponse::new("not_found", "nothing here");
        assert_eq!(e.code, "not_found");
        assert!(e.message.contains("nothing here"));
    }

    #[test]
    fn not_found_response_is_generic() {
        let e = ErrorResponse::from(&ServiceError::NotFound);
        assert_eq!(e.code, "not_found");
        assert_eq!(e.message, "the requested resource does not exist");
    }

    #[test]
    fn health_response_serde() {
        let h = HealthResponse {
            status: "ok".into(),
            keys_ready: true,
            active_generation: Some(3),
            generations: 4,
        };
        let json = serde_json::to_string(&h).unwrap();
        let decoded: HealthResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.active_generation, Some(3));
        assert_eq!(decoded.generations, 4);
    }
}
