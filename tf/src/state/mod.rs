//! Session state persistence
//!
//! The `SessionStore` trait plus its SQLite and in-memory implementations,
//! and the `SessionMutation` bundle a resolution persists through it.

mod mutation;
mod store;

pub use mutation::SessionMutation;
pub use store::{MemorySessionStore, SessionStore, SqliteSessionStore, StateError, VersionedSession};
