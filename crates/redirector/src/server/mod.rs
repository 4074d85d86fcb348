//! Axum HTTP redirect server, routing, and middleware.
//!
//! # Responsibilities
//! - Define the Axum router with the redirect fallback, health route, and
//!   shared middleware.
//! - Inject shared application state (`AppState`) into handlers.
//! - Keep every token rejection indistinguishable to the caller.

pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
