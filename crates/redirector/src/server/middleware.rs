//! Tower middleware pieces applied to the router.

use axum::http::Request;
use tower_http::trace::MakeSpan;
use tracing::Span;

/// Request span that records method and path but never the query string,
/// which carries the token.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathOnlySpan;

impl<B> MakeSpan<B> for PathOnlySpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
        )
    }
}
