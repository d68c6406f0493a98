//! Progress events.
//!
//! A closed tagged enum instead of the prefix-parsed strings the wire
//! format uses; the stream layer renders these back into the original
//! `message:`/`progress:` line encoding at the boundary.

use serde::{Deserialize, Serialize};

use crate::session::Fragment;

/// One immutable message from a job worker to the stream layer.
///
/// Ordering within one session's channel follows emission order; there is
/// no ordering across sessions. Exactly one terminal event (`Completed`
/// or `Failed`) is emitted per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Informational text for the client log
    Info { message: String },

    /// Encode progress within the current segment (0-100)
    SegmentProgress { percent: f32 },

    /// Overall job progress (0-100)
    Progress { percent: f32 },

    /// One fragment finished and is ready for download
    FragmentReady { fragment: Fragment },

    /// Terminal failure
    Failed { message: String },

    /// Terminal success
    Completed,
}

impl ProgressEvent {
    /// Create an informational message.
    pub fn info(message: impl Into<String>) -> Self {
        ProgressEvent::Info {
            message: message.into(),
        }
    }

    /// Create a per-segment progress update, clamped to 0-100.
    pub fn segment_progress(percent: f32) -> Self {
        ProgressEvent::SegmentProgress {
            percent: percent.clamp(0.0, 100.0),
        }
    }

    /// Create an overall progress update, clamped to 0-100.
    pub fn progress(percent: f32) -> Self {
        ProgressEvent::Progress {
            percent: percent.clamp(0.0, 100.0),
        }
    }

    /// Create a fragment-ready notification.
    pub fn fragment_ready(fragment: Fragment) -> Self {
        ProgressEvent::FragmentReady { fragment }
    }

    /// Create a terminal failure event.
    pub fn failed(message: impl Into<String>) -> Self {
        ProgressEvent::Failed {
            message: message.into(),
        }
    }

    /// Check whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Failed { .. } | ProgressEvent::Completed
        )
    }
}
