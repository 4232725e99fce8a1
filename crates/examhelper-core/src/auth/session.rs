use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::storage::KeyValueStorage;

/// Storage key holding the serialized session record
pub const SESSION_KEY: &str = "user";

/// The persisted session record.
///
/// Only `token` matters for authentication. Profile fields written by the
/// login flow are kept in `profile` so they survive a load/save round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(flatten)]
    pub profile: serde_json::Map<String, serde_json::Value>,
}

impl SessionData {
    /// Parse a stored record; anything that isn't a JSON object is no session.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!(error = %e, "Ignoring unparsable session record");
                None
            }
        }
    }

    /// The bearer token, if present and non-empty
    pub fn bearer_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Authenticated,
    Anonymous,
}

/// What the request pipeline needs from session state.
pub trait SessionStore: Send + Sync {
    /// Current bearer token. Missing or malformed sessions yield `None`.
    fn token(&self) -> Option<String>;

    /// Delete the session. Clearing an absent session succeeds.
    fn clear(&self) -> Result<()>;
}

/// Session record persisted under [`SESSION_KEY`] in a storage backend.
#[derive(Clone)]
pub struct Session {
    storage: Arc<dyn KeyValueStorage>,
}

impl Session {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Load the session record, treating unreadable or malformed data as absent
    pub fn load(&self) -> Option<SessionData> {
        match self.storage.get(SESSION_KEY) {
            Ok(Some(raw)) => SessionData::parse(&raw),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read session, continuing without one");
                None
            }
        }
    }

    /// Persist a session record, replacing any existing one
    pub fn save(&self, data: &SessionData) -> Result<()> {
        let contents = serde_json::to_string(data).context("Failed to serialize session")?;
        self.storage.set(SESSION_KEY, &contents)?;
        info!(username = ?data.username, "Session saved");
        Ok(())
    }

    pub fn state(&self) -> AuthState {
        match self.token() {
            Some(_) => AuthState::Authenticated,
            None => AuthState::Anonymous,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == AuthState::Authenticated
    }
}

impl SessionStore for Session {
    fn token(&self) -> Option<String> {
        self.load()
            .and_then(|data| data.bearer_token().map(str::to_string))
    }

    fn clear(&self) -> Result<()> {
        self.storage
            .remove(SESSION_KEY)
            .context("Failed to clear session")?;
        debug!("Session cleared");
        Ok(())
    }
}
