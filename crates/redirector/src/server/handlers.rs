//! Axum request handlers for all service endpoints.

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use common::{
    protocol::{ErrorResponse, HealthResponse},
    ServiceError,
};
use serde_json::Value;
use tracing::{info, warn};

use super::state::AppState;
use crate::token::{self, URL_FIELD};

/// Any path carrying `?x=<token>`: open the token and redirect to its `url`.
///
/// Every failure produces the same `404` response; the cause is only logged.
pub async fn redirect(State(state): State<AppState>, uri: Uri) -> Response {
    let payload = match token::decode_uri(&state.store, &uri) {
        Ok(p) => p,
        Err(e) => {
            warn!(reason = %e.kind(), "rejected redirect token");
            return error_response(&e.into());
        }
    };

    let Some(destination) = payload.get(URL_FIELD).and_then(Value::as_str) else {
        warn!("token payload has no string url");
        return error_response(&ServiceError::NotFound);
    };
    let Ok(location) = HeaderValue::from_str(destination) else {
        warn!("token url is not a valid Location header");
        return error_response(&ServiceError::NotFound);
    };

    let payload = Value::Object(payload);
    info!(payload = %payload, "click");
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}

/// `GET /health`: liveness and readiness check.
///
/// Returns `200 OK` when at least one key generation is loaded.
/// Returns `503 Service Unavailable` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let snapshot = state.store.snapshot();
    let keys_ready = !snapshot.is_empty();

    let (status_code, status_str) = if keys_ready {
        (StatusCode::OK, "ok")
    } else {
        let err = ServiceError::Unavailable("no key generation loaded".into());
        warn!(error = %err, "health check degraded");
        (status_of(&err), "degraded")
    };

    let body = HealthResponse {
        status: status_str.into(),
        keys_ready,
        active_generation: snapshot.active_generation(),
        generations: snapshot.len(),
    };
    (status_code, Json(body)).into_response()
}

fn error_response(err: &ServiceError) -> Response {
    (status_of(err), Json(ErrorResponse::from(err))).into_response()
}

fn status_of(err: &ServiceError) -> StatusCode {
    StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
