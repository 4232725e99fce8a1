//! Authentication module for managing the persisted session.
//!
//! This module provides:
//! - `Session`: the `"user"` session record and the `SessionStore` view of it
//! - `KeyValueStorage` backends: file, OS keychain, in-memory
//! - `SessionEvents`: the signal raised when the server rejects the session

pub mod credentials;
pub mod events;
pub mod session;
pub mod storage;

pub use credentials::KeychainStorage;
pub use events::{SessionEvent, SessionEvents};
pub use session::{AuthState, Session, SessionData, SessionStore, SESSION_KEY};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
