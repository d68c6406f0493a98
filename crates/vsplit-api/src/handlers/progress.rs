//! Live progress stream (SSE).
//!
//! Drains a session's progress channel and renders each event as an SSE
//! data payload. The payload grammar is what the browser UI consumes:
//!
//! - `message: <text>`: human-readable status line
//! - `progress: <pct>`: encode progress of the current fragment
//! - `overall_progress: <pct>`: whole-job progress
//! - `fragments: <json>`: full fragment list, sent once on success
//! - `error: <text>`: failure, stream ends after this
//!
//! The receive loop polls with a short timeout so an idle stream still
//! refreshes the session's activity timestamp, and detects a session
//! reaped mid-stream instead of hanging forever.
//!
//! Reconnects: at most one consumer is live at a time (409 otherwise),
//! but consumers may come and go sequentially. A disconnecting client's
//! receiver is handed back to the registry by a drop guard, and a session
//! that already reached a terminal state replays that state from the
//! registry snapshot instead of consuming the spent channel.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tracing::{debug, warn};

use vsplit_engine::{schedule_source_cleanup, EngineError, SessionRegistry};
use vsplit_models::{Fragment, ProgressEvent, Session, SessionId, SessionStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Holds a session's receiver for the lifetime of one stream.
///
/// Dropping the guard with the receiver still armed (client disconnected
/// before a terminal event) returns it to the registry so the next
/// consumer can resume. After a terminal event the channel is spent and
/// the guard is disarmed instead.
struct ReceiverGuard {
    session_id: SessionId,
    registry: Arc<SessionRegistry>,
    rx: Option<UnboundedReceiver<ProgressEvent>>,
}

impl ReceiverGuard {
    fn new(
        session_id: SessionId,
        registry: Arc<SessionRegistry>,
        rx: UnboundedReceiver<ProgressEvent>,
    ) -> Self {
        Self {
            session_id,
            registry,
            rx: Some(rx),
        }
    }

    async fn recv(&mut self) -> Option<ProgressEvent> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Drop the receiver without restoring it.
    fn disarm(&mut self) {
        self.rx = None;
    }
}

impl Drop for ReceiverGuard {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            let registry = Arc::clone(&self.registry);
            let session_id = self.session_id.clone();
            tokio::spawn(async move {
                registry.restore_receiver(&session_id, rx).await;
            });
        }
    }
}

/// `GET /api/progress/{session_id}`
pub async fn progress_stream(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let session_id = SessionId::from_string(session_id);
    if !session_id.is_path_safe() {
        return Err(ApiError::bad_request("Invalid session id"));
    }

    let registry = Arc::clone(&state.registry);
    let engine = state.engine.clone();
    let poll = engine.poll_timeout;

    // Terminal sessions are replayed from the snapshot; only a running
    // session consumes the live channel (404 unknown, 409 while another
    // consumer is live).
    let snapshot = registry
        .snapshot(&session_id)
        .await
        .ok_or_else(|| EngineError::SessionNotFound(session_id.clone()))?;
    let live = if snapshot.is_terminal() {
        None
    } else {
        let rx = registry.take_receiver(&session_id).await?;
        Some(ReceiverGuard::new(
            session_id.clone(),
            Arc::clone(&registry),
            rx,
        ))
    };

    let stream = async_stream::stream! {
        match live {
            None => {
                yield Ok(Event::default().data(encode_terminal_snapshot(&snapshot)));
                schedule_source_cleanup(&engine, &session_id, engine.cleanup_grace);
            }
            Some(mut guard) => loop {
                match timeout(poll, guard.recv()).await {
                    Ok(Some(ProgressEvent::Completed)) => {
                        let fragments = registry
                            .snapshot(&session_id)
                            .await
                            .map(|s| s.fragments)
                            .unwrap_or_default();
                        yield Ok(Event::default().data(encode_fragments(&fragments)));
                        guard.disarm();
                        schedule_source_cleanup(&engine, &session_id, engine.cleanup_grace);
                        break;
                    }
                    Ok(Some(event)) => {
                        let terminal = event.is_terminal();
                        yield Ok(Event::default().data(encode_event(&event)));
                        if terminal {
                            guard.disarm();
                            schedule_source_cleanup(&engine, &session_id, engine.cleanup_grace);
                            break;
                        }
                    }
                    Ok(None) => {
                        // Sender gone without a terminal event: session removed
                        warn!(session_id = %session_id, "Progress channel closed mid-stream");
                        yield Ok(Event::default().data("error: Session is no longer available"));
                        guard.disarm();
                        break;
                    }
                    Err(_) => {
                        // Idle tick: keep the session alive, or bail out if it
                        // was reaped while we were waiting.
                        if !registry.contains(&session_id).await {
                            yield Ok(Event::default().data("error: Session expired"));
                            guard.disarm();
                            break;
                        }
                        registry.touch(&session_id).await;
                    }
                }
            },
        }
        debug!(session_id = %session_id, "Progress stream closed");
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Serialize)]
struct FragmentWire<'a> {
    filename: &'a str,
    url: &'a str,
}

/// Encode one non-success event as its wire payload.
fn encode_event(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::Info { message } => format!("message: {message}"),
        ProgressEvent::SegmentProgress { percent } => format!("progress: {percent:.1}"),
        ProgressEvent::Progress { percent } => format!("overall_progress: {percent:.1}"),
        ProgressEvent::FragmentReady { fragment } => {
            format!("message: Fragment ready: {}", fragment.url)
        }
        ProgressEvent::Failed { message } => format!("error: {message}"),
        // Resolved against the registry snapshot by the stream loop
        ProgressEvent::Completed => "message: Done".to_string(),
    }
}

/// Encode the terminal fragment list payload.
fn encode_fragments(fragments: &[Fragment]) -> String {
    let wire: Vec<FragmentWire<'_>> = fragments
        .iter()
        .map(|f| FragmentWire {
            filename: &f.filename,
            url: &f.url,
        })
        .collect();
    // Serializing borrowed strings cannot fail
    let json = serde_json::to_string(&wire).unwrap_or_else(|_| "[]".to_string());
    format!("fragments: {json}")
}

/// Encode an already-terminal session for a reconnecting client.
fn encode_terminal_snapshot(session: &Session) -> String {
    match (session.status, &session.last_error) {
        (SessionStatus::Failed, Some(error)) => format!("error: {}", error.message),
        (SessionStatus::Failed, None) => "error: Job failed".to_string(),
        _ => encode_fragments(&session.fragments),
    }
}
