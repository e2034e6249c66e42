//! Shared session store.
//!
//! Readers take synchronous snapshots with [`SessionStore::get_state`] or
//! watch for changes with [`SessionStore::subscribe`]. Stream consumers
//! write through [`SessionStore::reread_and_update`], which re-reads the
//! active session under the write lock before touching anything.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use parley_types::Message;

use crate::session::Session;

/// Snapshot of every session and which one is active.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub sessions: HashMap<String, Session>,
    pub active_session_id: Option<String>,
}

impl StoreState {
    pub fn session(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active_session_id
            .as_deref()
            .and_then(|id| self.sessions.get(id))
    }
}

/// Cloneable handle to the session store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    state: Arc<RwLock<StoreState>>,
    version: Arc<watch::Sender<u64>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            version: Arc::new(version),
        }
    }

    /// Synchronous snapshot of the whole store.
    pub fn get_state(&self) -> StoreState {
        self.state.read().clone()
    }

    /// Receiver that ticks after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn session(&self, id: &str) -> Option<Session> {
        self.state.read().sessions.get(id).cloned()
    }

    pub fn active_session_id(&self) -> Option<String> {
        self.state.read().active_session_id.clone()
    }

    fn notify(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session management
    // ─────────────────────────────────────────────────────────────────────

    /// Add a session and make it active. Returns its id.
    pub fn create_session(&self, session: Session) -> String {
        let id = session.id.clone();
        {
            let mut state = self.state.write();
            state.sessions.insert(id.clone(), session);
            state.active_session_id = Some(id.clone());
        }
        self.notify();
        id
    }

    /// Make a session active. Returns `false` if it does not exist.
    pub fn activate(&self, session_id: &str) -> bool {
        let found = {
            let mut state = self.state.write();
            if state.sessions.contains_key(session_id) {
                state.active_session_id = Some(session_id.to_string());
                true
            } else {
                false
            }
        };
        if found {
            tracing::debug!(session_id, "Activated session");
            self.notify();
        }
        found
    }

    /// Remove one message. Returns it if it existed.
    pub fn delete_message(&self, session_id: &str, message_id: &str) -> Option<Message> {
        let removed = {
            let mut state = self.state.write();
            let session = state.sessions.get_mut(session_id)?;
            let index = session.messages.iter().position(|m| m.id == message_id)?;
            Some(session.messages.remove(index))
        };
        if removed.is_some() {
            self.notify();
        }
        removed
    }

    /// Clear the loading flag of one session, active or not.
    pub fn clear_loading(&self, session_id: &str) {
        let changed = {
            let mut state = self.state.write();
            match state.sessions.get_mut(session_id) {
                Some(session) => {
                    let was_loading = session.loading
                        || session.messages.iter().any(|m| m.is_loading);
                    session.loading = false;
                    for msg in &mut session.messages {
                        msg.is_loading = false;
                    }
                    was_loading
                }
                None => false,
            }
        };
        if changed {
            self.notify();
        }
    }

    /// Apply `f` to a session whether or not it is active.
    pub fn update<R>(&self, session_id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let result = {
            let mut state = self.state.write();
            state.sessions.get_mut(session_id).map(f)
        };
        if result.is_some() {
            self.notify();
        }
        result
    }

    /// Re-read the active session id and the session's current messages,
    /// then apply `f` only if `session_id` is still the active session.
    ///
    /// Returns `None`, without mutating anything, when another session has
    /// become active or the session is gone.
    pub fn reread_and_update<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        let result = {
            let mut state = self.state.write();
            if state.active_session_id.as_deref() != Some(session_id) {
                return None;
            }
            state.sessions.get_mut(session_id).map(f)
        };
        if result.is_some() {
            self.notify();
        }
        result
    }
}
