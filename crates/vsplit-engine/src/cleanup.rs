//! Filesystem cleanup for session directories.
//!
//! Two callers: the deferred source cleanup scheduled when a job reaches a
//! terminal state, and the reaper/cleanup endpoint which purges everything
//! a session left on disk. All removals are idempotent; a directory that is
//! already gone is success, not an error.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use vsplit_models::SessionId;

use crate::config::EngineConfig;

/// Delete a directory tree if it exists.
pub async fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed directory");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Purge both on-disk directories of a session (upload and fragments).
pub async fn purge_session_dirs(config: &EngineConfig, session_id: &SessionId) {
    for dir in [
        config.upload_dir(session_id.as_str()),
        config.fragment_dir(session_id.as_str()),
    ] {
        if let Err(e) = remove_dir_if_exists(&dir).await {
            warn!(
                session_id = %session_id,
                path = %dir.display(),
                error = %e,
                "Failed to remove session directory"
            );
        }
    }
}

/// Schedule removal of a session's uploaded source after a grace period.
///
/// Fire-and-forget: the source is no longer needed once the job is
/// terminal, but the grace period keeps it around briefly in case a late
/// diagnostic look is wanted. Fragments are NOT touched; they stay
/// downloadable until the session is cleaned up or reaped.
pub fn schedule_source_cleanup(config: &EngineConfig, session_id: &SessionId, grace: Duration) {
    let dir = config.upload_dir(session_id.as_str());
    let session_id = session_id.clone();

    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        match remove_dir_if_exists(&dir).await {
            Ok(()) => debug!(session_id = %session_id, "Uploaded source removed"),
            Err(e) => warn!(
                session_id = %session_id,
                path = %dir.display(),
                error = %e,
                "Deferred source cleanup failed"
            ),
        }
    });
}
