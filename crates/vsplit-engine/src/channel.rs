//! Per-session progress channel, worker side.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use vsplit_models::{Fragment, ProgressEvent, SessionId};

use crate::registry::SessionRegistry;

/// Sender half of one session's progress channel.
///
/// Every emission refreshes the session's activity timestamp so a busy job
/// is never reaped mid-run. Sends are best-effort: once the consumer is
/// gone (client never connected, or disconnected) events are dropped and
/// the session snapshot in the registry remains the source of truth.
#[derive(Clone)]
pub struct ProgressSender {
    session_id: SessionId,
    tx: UnboundedSender<ProgressEvent>,
    registry: Arc<SessionRegistry>,
}

impl ProgressSender {
    pub(crate) fn new(
        session_id: SessionId,
        tx: UnboundedSender<ProgressEvent>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            session_id,
            tx,
            registry,
        }
    }

    /// The session this sender belongs to.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Send an event without touching the activity timestamp.
    ///
    /// Safe to call from sync contexts such as the ffmpeg progress callback.
    pub fn send_raw(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            debug!(session_id = %self.session_id, "Progress event dropped, no consumer");
        }
    }

    /// Send an event and refresh the session's activity timestamp.
    pub async fn send(&self, event: ProgressEvent) {
        self.registry.touch(&self.session_id).await;
        self.send_raw(event);
    }

    /// Emit an informational message.
    pub async fn info(&self, message: impl Into<String>) {
        self.send(ProgressEvent::info(message)).await;
    }

    /// Emit a per-segment encode progress update (sync, no touch).
    pub fn segment_progress(&self, percent: f32) {
        self.send_raw(ProgressEvent::segment_progress(percent));
    }

    /// Emit an overall progress update.
    pub async fn progress(&self, percent: f32) {
        self.send(ProgressEvent::progress(percent)).await;
    }

    /// Emit a fragment-ready notification.
    pub async fn fragment_ready(&self, fragment: Fragment) {
        self.send(ProgressEvent::fragment_ready(fragment)).await;
    }

    /// Emit the terminal failure event.
    pub async fn failed(&self, message: impl Into<String>) {
        self.send(ProgressEvent::failed(message)).await;
    }

    /// Emit the terminal success event.
    pub async fn completed(&self) {
        self.send(ProgressEvent::Completed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsplit_models::Session;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let registry = Arc::new(SessionRegistry::new());
        let session = Session::new(60.0, "/tmp/in.mp4");
        let id = session.id.clone();
        let sender = registry.create(session).await;
        let mut rx = registry.take_receiver(&id).await.unwrap();

        sender.info("starting").await;
        sender.progress(50.0).await;
        sender.completed().await;

        assert!(matches!(rx.recv().await, Some(ProgressEvent::Info { .. })));
        assert!(matches!(
            rx.recv().await,
            Some(ProgressEvent::Progress { .. })
        ));
        assert!(matches!(rx.recv().await, Some(ProgressEvent::Completed)));
    }

    #[tokio::test]
    async fn test_send_without_consumer_does_not_panic() {
        let registry = Arc::new(SessionRegistry::new());
        let session = Session::new(60.0, "/tmp/in.mp4");
        let id = session.id.clone();
        let sender = registry.create(session).await;

        // Take and drop the receiver to simulate a departed client
        drop(registry.take_receiver(&id).await.unwrap());

        sender.info("nobody listening").await;
        sender.completed().await;
    }
}
