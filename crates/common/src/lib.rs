//! Common types, wire bodies, and errors shared across the redirect service crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
pub use protocol::Payload;
