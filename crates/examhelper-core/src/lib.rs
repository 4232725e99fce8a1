//! Core library for examhelper.
//!
//! Provides the session-aware API client for the exam helper backend:
//! bearer tokens are read from the persisted session on every request, and
//! a 401/403 answer clears the session and raises
//! [`auth::SessionEvent::Unauthenticated`] so the application can restart
//! from a clean state.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, Pipeline};
pub use auth::{AuthState, Session, SessionData, SessionEvent, SessionEvents, SessionStore};
pub use config::{Config, StorageBackend};
