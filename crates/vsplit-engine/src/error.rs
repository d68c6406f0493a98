//! Engine error types.

use thiserror::Error;
use vsplit_models::SessionId;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the job engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Progress stream for session {0} already has an active consumer")]
    StreamBusy(SessionId),

    #[error("Media error: {0}")]
    Media(#[from] vsplit_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
