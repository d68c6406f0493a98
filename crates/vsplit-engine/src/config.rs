//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Job engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory for uploaded source files (one subdir per session)
    pub upload_root: PathBuf,
    /// Root directory for produced fragments (one subdir per session)
    pub fragment_root: PathBuf,
    /// How often the reaper sweeps
    pub reap_interval: Duration,
    /// Inactivity threshold after which a session is evicted
    pub reap_threshold: Duration,
    /// Grace period before the uploaded source is deleted post-completion
    pub cleanup_grace: Duration,
    /// Poll timeout used by the progress stream to refresh activity
    pub poll_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            upload_root: PathBuf::from("uploads"),
            fragment_root: PathBuf::from("fragments"),
            reap_interval: Duration::from_secs(600),
            reap_threshold: Duration::from_secs(3600),
            cleanup_grace: Duration::from_secs(30),
            poll_timeout: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            upload_root: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_root),
            fragment_root: std::env::var("FRAGMENT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.fragment_root),
            reap_interval: duration_from_env("REAP_INTERVAL_SECS", defaults.reap_interval),
            reap_threshold: duration_from_env("REAP_THRESHOLD_SECS", defaults.reap_threshold),
            cleanup_grace: duration_from_env("CLEANUP_GRACE_SECS", defaults.cleanup_grace),
            poll_timeout: duration_from_env("PROGRESS_POLL_SECS", defaults.poll_timeout),
        };

        config.validated()
    }

    /// Enforce that the reap threshold is at least the sweep interval,
    /// otherwise a session could be evicted before a client ever connects.
    pub fn validated(mut self) -> Self {
        if self.reap_threshold < self.reap_interval {
            warn!(
                "reap threshold {:?} is shorter than the sweep interval {:?}; clamping up",
                self.reap_threshold, self.reap_interval
            );
            self.reap_threshold = self.reap_interval;
        }
        self
    }

    /// Upload directory for one session.
    pub fn upload_dir(&self, session_id: &str) -> PathBuf {
        self.upload_root.join(session_id)
    }

    /// Fragment directory for one session.
    pub fn fragment_dir(&self, session_id: &str) -> PathBuf {
        self.fragment_root.join(session_id)
    }
}

fn duration_from_env(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
