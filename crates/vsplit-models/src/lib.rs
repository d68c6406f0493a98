//! Shared data models for the vsplit backend.
//!
//! This crate provides Serde-serializable types for:
//! - Sessions and their lifecycle status
//! - Produced fragments
//! - Progress events flowing from the worker to the stream layer

pub mod event;
pub mod session;

// Re-export common types
pub use event::ProgressEvent;
pub use session::{Fragment, Session, SessionError, SessionId, SessionStatus};
