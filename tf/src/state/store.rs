//! Session persistence
//!
//! The narrow store interface the engine talks to, plus its two
//! implementations: SQLite-backed for production and in-memory for tests.
//! Both enforce the same contract: `apply` is atomic per session and a
//! writer holding a stale version gets `StateError::Conflict`, never a
//! silent merge. Distinct sessions do not interfere.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use sessionstore::{Filter, Store, StoreError};
use thiserror::Error;
use tracing::debug;

use crate::domain::SessionState;

use super::mutation::SessionMutation;

/// Errors from session state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("write conflict on session {0}; retry the operation")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<StoreError> for StateError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Conflict { id, .. } => Self::Conflict(id),
            StoreError::Duplicate(id) => Self::Store(format!("session already exists: {id}")),
            other => Self::Store(other.to_string()),
        }
    }
}

/// A session together with the version it was read at
#[derive(Debug, Clone)]
pub struct VersionedSession {
    pub state: SessionState,
    pub version: i64,
}

/// Narrow persistence interface for sessions
///
/// Production and test implementations satisfy the same trait so nothing in
/// the engine is patched per-test.
pub trait SessionStore: Send + Sync {
    /// Persist a new session; the id must be unused
    fn create(&self, session: &SessionState) -> Result<String, StateError>;

    /// Load a session with its current version
    fn get(&self, session_id: &str) -> Result<Option<VersionedSession>, StateError>;

    /// Apply a mutation atomically; stale `expected_version` → `Conflict`
    fn apply(&self, session_id: &str, mutation: &SessionMutation) -> Result<SessionState, StateError>;

    /// List sessions matching the filters (empty slice = all)
    fn list(&self, filters: &[Filter]) -> Result<Vec<SessionState>, StateError>;
}

/// SQLite-backed session store
pub struct SqliteSessionStore {
    store: Store,
}

impl SqliteSessionStore {
    /// Open or create the store in the given directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateError> {
        debug!(path = %path.as_ref().display(), "SqliteSessionStore::open: called");
        let store = Store::open(path)?;
        store.rebuild_indexes::<SessionState>()?;
        Ok(Self { store })
    }
}

impl SessionStore for SqliteSessionStore {
    fn create(&self, session: &SessionState) -> Result<String, StateError> {
        debug!(session_id = %session.session_id, "SqliteSessionStore::create: called");
        Ok(self.store.create(session)?)
    }

    fn get(&self, session_id: &str) -> Result<Option<VersionedSession>, StateError> {
        debug!(%session_id, "SqliteSessionStore::get: called");
        let versioned = self.store.get_with_version::<SessionState>(session_id)?;
        Ok(versioned.map(|v| VersionedSession {
            state: v.record,
            version: v.version,
        }))
    }

    fn apply(&self, session_id: &str, mutation: &SessionMutation) -> Result<SessionState, StateError> {
        debug!(%session_id, expected_version = mutation.expected_version, "SqliteSessionStore::apply: called");
        let versioned = self
            .store
            .get_with_version::<SessionState>(session_id)?
            .ok_or_else(|| StateError::NotFound(session_id.to_string()))?;

        let mut state = versioned.record;
        mutation.apply_to(&mut state);
        // The version check inside update is what makes this atomic per
        // session: a writer that read before us fails with Conflict here.
        self.store.update(&state, mutation.expected_version)?;
        Ok(state)
    }

    fn list(&self, filters: &[Filter]) -> Result<Vec<SessionState>, StateError> {
        debug!(filter_count = filters.len(), "SqliteSessionStore::list: called");
        Ok(self.store.list(filters)?)
    }
}

/// In-memory session store (tests)
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, (SessionState, i64)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, session: &SessionState) -> Result<String, StateError> {
        debug!(session_id = %session.session_id, "MemorySessionStore::create: called");
        let mut sessions = self.sessions.write().map_err(|_| StateError::Store("lock poisoned".into()))?;
        if sessions.contains_key(&session.session_id) {
            return Err(StateError::Store(format!(
                "session already exists: {}",
                session.session_id
            )));
        }
        sessions.insert(session.session_id.clone(), (session.clone(), 1));
        Ok(session.session_id.clone())
    }

    fn get(&self, session_id: &str) -> Result<Option<VersionedSession>, StateError> {
        let sessions = self.sessions.read().map_err(|_| StateError::Store("lock poisoned".into()))?;
        Ok(sessions.get(session_id).map(|(state, version)| VersionedSession {
            state: state.clone(),
            version: *version,
        }))
    }

    fn apply(&self, session_id: &str, mutation: &SessionMutation) -> Result<SessionState, StateError> {
        debug!(%session_id, expected_version = mutation.expected_version, "MemorySessionStore::apply: called");
        let mut sessions = self.sessions.write().map_err(|_| StateError::Store("lock poisoned".into()))?;
        let (state, version) = sessions
            .get_mut(session_id)
            .ok_or_else(|| StateError::NotFound(session_id.to_string()))?;

        if *version != mutation.expected_version {
            debug!(%session_id, found = *version, "MemorySessionStore::apply: version conflict");
            return Err(StateError::Conflict(session_id.to_string()));
        }

        mutation.apply_to(state);
        *version += 1;
        Ok(state.clone())
    }

    fn list(&self, filters: &[Filter]) -> Result<Vec<SessionState>, StateError> {
        let sessions = self.sessions.read().map_err(|_| StateError::Store("lock poisoned".into()))?;
        let mut matching: Vec<SessionState> = sessions
            .values()
            .filter(|(state, _)| {
                filters.iter().all(|f| {
                    sessionstore::Record::indexed_fields(state)
                        .get(&f.field)
                        .map(|v| v.as_text() == f.value.as_text())
                        .unwrap_or(false)
                })
            })
            .map(|(state, _)| state.clone())
            .collect();
        matching.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(matching)
    }
}
