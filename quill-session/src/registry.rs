//! Session registry.
//!
//! Process-wide map from user id to active session handle. Enforces
//! "at most one active session per user" and a configurable capacity
//! bound. An explicit service object injected into the engine, not a
//! global.

use crate::session::SessionCommand;
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};

/// Why an acquire failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    /// The user already has an active session
    AlreadyActive,
    /// The registry is at its concurrent-session limit
    CapacityExceeded,
}

/// Handle to a running session task.
#[derive(Clone)]
pub struct SessionHandle {
    /// Owning user id
    pub user_id: String,
    /// Channel the session is pinned to
    pub channel_id: String,
    /// Run-trigger phrase from the bound profile
    pub run_key: Option<String>,
    /// Command queue into the session task
    pub tx: mpsc::Sender<SessionCommand>,
}

/// Registry of active sessions.
pub struct SessionRegistry {
    inner: Mutex<HashMap<String, SessionHandle>>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Register a new session.
    ///
    /// The existence check, capacity check, and insert happen under one
    /// lock acquisition, so interleaved acquires for the same user
    /// cannot both succeed.
    pub async fn acquire(&self, handle: SessionHandle) -> Result<(), AcquireError> {
        let mut inner = self.inner.lock().await;
        if inner.contains_key(&handle.user_id) {
            return Err(AcquireError::AlreadyActive);
        }
        if inner.len() >= self.max_sessions {
            return Err(AcquireError::CapacityExceeded);
        }
        tracing::debug!(user_id = %handle.user_id, channel_id = %handle.channel_id, "Session registered");
        inner.insert(handle.user_id.clone(), handle);
        Ok(())
    }

    /// Remove a session. Releasing an unregistered user is a no-op.
    pub async fn release(&self, user_id: &str) {
        let mut inner = self.inner.lock().await;
        if inner.remove(user_id).is_some() {
            tracing::debug!(user_id = %user_id, "Session released");
        }
    }

    /// Get the user's active session handle, if any.
    pub async fn get(&self, user_id: &str) -> Option<SessionHandle> {
        let inner = self.inner.lock().await;
        inner.get(user_id).cloned()
    }

    /// Find the session pinned to a channel, if any.
    pub async fn find_by_channel(&self, channel_id: &str) -> Option<SessionHandle> {
        let inner = self.inner.lock().await;
        inner
            .values()
            .find(|handle| handle.channel_id == channel_id)
            .cloned()
    }

    /// Number of active sessions.
    pub async fn count(&self) -> usize {
        self.inner.lock().await.len()
    }
}
