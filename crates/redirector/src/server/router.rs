//! Axum router construction.

use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
///
/// `/health` is the only named route; every other path is treated as a
/// redirect link, since the slug prefix in front of the token is arbitrary.
pub fn build(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .fallback(handlers::redirect)
        .layer(TraceLayer::new_for_http().make_span_with(middleware::PathOnlySpan))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
