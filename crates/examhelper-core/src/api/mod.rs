//! REST API client module for the exam helper backend.
//!
//! This module provides the `ApiClient` for talking to the backend, and the
//! middleware `Pipeline` it runs every request through.
//!
//! The backend uses bearer token authentication. Tokens are read from the
//! persisted session on every request; a 401 or 403 answer clears the session.

pub mod client;
pub mod error;
pub mod pipeline;

pub use client::{ApiClient, DEFAULT_IDIOM_LIMIT};
pub use error::ApiError;
pub use pipeline::{BearerAuth, Pipeline, RequestMiddleware, ResponseMiddleware, SessionGuard};
