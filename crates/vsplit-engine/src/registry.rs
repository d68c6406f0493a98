//! Session registry.
//!
//! The one structure shared between request handlers, job workers and the
//! reaper. Each entry couples a session with the endpoints of its progress
//! channel: the sender side is handed to the owning worker, the receiver
//! side is taken (once) by the progress stream.
//!
//! Mutating calls for sessions that no longer exist are logged no-ops: a
//! worker may finish updating after its session was reaped, and that must
//! never crash the worker.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use tracing::warn;

use vsplit_models::{Fragment, ProgressEvent, Session, SessionError, SessionId, SessionStatus};

use crate::channel::ProgressSender;
use crate::error::{EngineError, EngineResult};

struct SessionEntry {
    session: Session,
    tx: UnboundedSender<ProgressEvent>,
    /// Receiver slot; `None` once a consumer has taken it
    rx: Option<UnboundedReceiver<ProgressEvent>>,
}

/// Process-wide table of sessions, keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session and create its progress channel.
    ///
    /// Returns the sender half for the owning worker.
    pub async fn create(self: &Arc<Self>, session: Session) -> ProgressSender {
        let id = session.id.clone();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut sessions = self.sessions.write().await;
        sessions.insert(
            id.clone(),
            SessionEntry {
                session,
                tx: tx.clone(),
                rx: Some(rx),
            },
        );

        ProgressSender::new(id, tx, Arc::clone(self))
    }

    /// Snapshot a session's current state.
    pub async fn snapshot(&self, id: &SessionId) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions.get(id).map(|e| e.session.clone())
    }

    /// Whether the session still exists.
    pub async fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Refresh a session's activity timestamp.
    pub async fn touch(&self, id: &SessionId) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(id) {
            entry.session.touch();
        }
    }

    /// Append a produced fragment. No-op once the session is terminal.
    pub async fn append_fragment(&self, id: &SessionId, fragment: Fragment) {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(entry) if entry.session.is_terminal() => {
                warn!(session_id = %id, "Fragment appended after terminal state; dropping");
            }
            Some(entry) => {
                entry.session.fragments.push(fragment);
                entry.session.touch();
            }
            None => warn!(session_id = %id, "Fragment appended for unknown session"),
        }
    }

    /// Mark the session as running.
    pub async fn set_running(&self, id: &SessionId) {
        self.set_status(id, SessionStatus::Running, None).await;
    }

    /// Mark the session as succeeded.
    pub async fn set_succeeded(&self, id: &SessionId) {
        self.set_status(id, SessionStatus::Succeeded, None).await;
    }

    /// Mark the session as failed with error details.
    pub async fn set_failed(&self, id: &SessionId, error: SessionError) {
        self.set_status(id, SessionStatus::Failed, Some(error)).await;
    }

    async fn set_status(&self, id: &SessionId, status: SessionStatus, error: Option<SessionError>) {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(entry) if entry.session.is_terminal() => {
                warn!(
                    session_id = %id,
                    current = %entry.session.status,
                    requested = %status,
                    "Ignoring status transition out of terminal state"
                );
            }
            Some(entry) => {
                entry.session.status = status;
                entry.session.last_error = error;
                entry.session.touch();
            }
            None => warn!(session_id = %id, "Status update for unknown session"),
        }
    }

    /// Remove a session, returning its final state if it existed.
    pub async fn remove(&self, id: &SessionId) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id).map(|e| e.session)
    }

    /// Take the receiver half of a session's progress channel.
    ///
    /// At most one active consumer per session: a second call while the
    /// first consumer is live fails with `StreamBusy`.
    pub async fn take_receiver(
        &self,
        id: &SessionId,
    ) -> EngineResult<UnboundedReceiver<ProgressEvent>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.clone()))?;
        entry
            .rx
            .take()
            .ok_or_else(|| EngineError::StreamBusy(id.clone()))
    }

    /// Return a receiver to its session's slot.
    ///
    /// Called when a streaming consumer disconnects before the channel is
    /// drained, so a later reconnect can resume consuming. Dropped if the
    /// session is gone or the slot is somehow occupied.
    pub async fn restore_receiver(&self, id: &SessionId, rx: UnboundedReceiver<ProgressEvent>) {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(entry) if entry.rx.is_none() => entry.rx = Some(rx),
            Some(_) => {
                warn!(session_id = %id, "Receiver restored into an occupied slot; dropping")
            }
            None => drop(rx),
        }
    }

    /// Ids of sessions idle for longer than `threshold_secs`.
    pub async fn stale_sessions(&self, threshold_secs: i64) -> Vec<SessionId> {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|e| (Utc::now() - e.session.last_activity_at).num_seconds() > threshold_secs)
            .map(|e| e.session.id.clone())
            .collect()
    }

    /// All currently known session ids.
    pub async fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Backdate a session's activity timestamp (test hook for the reaper).
    #[cfg(test)]
    pub(crate) async fn backdate_activity(&self, id: &SessionId, seconds: i64) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(id) {
            entry.session.last_activity_at = Utc::now() - chrono::Duration::seconds(seconds);
        }
    }
}
