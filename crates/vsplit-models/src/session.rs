//! Session models.
//!
//! A session is one submitted split job: its identifier doubles as the
//! namespace for on-disk storage (uploads and fragments), so ids are
//! generated as UUIDs and never taken from client input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for a split session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id is safe to embed in a filesystem path.
    ///
    /// Generated ids always are; ids echoed back by clients are checked
    /// before touching the disk.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && !self.0.contains("..")
            && !self.0.contains('/')
            && !self.0.contains('\\')
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Session processing status.
///
/// Transitions are monotonic: `Pending -> Running -> {Succeeded|Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Job accepted, worker not yet started
    #[default]
    Pending,
    /// Worker is producing fragments
    Running,
    /// All fragments produced
    Succeeded,
    /// Probe or encode failed
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Succeeded => "succeeded",
            SessionStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more transitions expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Succeeded | SessionStatus::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One produced fragment of the source video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// 1-based fragment index (matches the filename)
    pub index: u32,
    /// Fragment filename, e.g. `fragment_3.mp4`
    pub filename: String,
    /// Relative download URL, e.g. `/fragments/<session>/<filename>`
    pub url: String,
}

impl Fragment {
    /// Build a fragment record for a session-relative file.
    pub fn new(session_id: &SessionId, index: u32, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let url = format!("/fragments/{}/{}", session_id, filename);
        Self {
            index,
            filename,
            url,
        }
    }
}

/// Failure details attached to a failed session.
///
/// `message` is what the client sees; `detail` carries the internal
/// diagnostic (ffmpeg stderr, exit codes) and is only logged server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SessionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: Some(detail.into()),
        }
    }
}

/// One submitted split job and its state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session ID
    pub id: SessionId,

    /// Current status
    #[serde(default)]
    pub status: SessionStatus,

    /// Requested fragment length in seconds (always > 0)
    pub segment_duration: f64,

    /// Path to the uploaded source file
    pub source_path: PathBuf,

    /// Fragments produced so far, in index order (append-only)
    #[serde(default)]
    pub fragments: Vec<Fragment>,

    /// Failure details, present only when status is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<SessionError>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last progress emission or external access; drives reaping
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    /// Create a new pending session.
    pub fn new(segment_duration: f64, source_path: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            status: SessionStatus::Pending,
            segment_duration,
            source_path: source_path.into(),
            fragments: Vec::new(),
            last_error: None,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Create a pending session with a pre-generated id.
    ///
    /// Used when the id has to exist before the session does, e.g. to name
    /// the upload directory the source file is saved into.
    pub fn with_id(id: SessionId, segment_duration: f64, source_path: impl Into<PathBuf>) -> Self {
        let mut session = Self::new(segment_duration, source_path);
        session.id = id;
        session
    }

    /// Check if the session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Refresh the activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    /// Seconds since the last recorded activity.
    pub fn idle_seconds(&self) -> i64 {
        (Utc::now() - self.last_activity_at).num_seconds()
    }
}
