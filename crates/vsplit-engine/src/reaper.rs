//! Session reaper.
//!
//! Periodically evicts sessions that have been idle past the configured
//! threshold, removing both the registry entry and the session's on-disk
//! directories. Also sweeps orphan directories: leftovers from a previous
//! process whose sessions no longer exist in the registry.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use vsplit_models::SessionId;

use crate::cleanup::purge_session_dirs;
use crate::config::EngineConfig;
use crate::registry::SessionRegistry;

/// Background task evicting idle sessions and orphaned directories.
pub struct SessionReaper {
    registry: Arc<SessionRegistry>,
    config: EngineConfig,
}

/// What one sweep removed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Registry sessions evicted for inactivity
    pub sessions_reaped: usize,
    /// On-disk directories with no live session
    pub orphans_removed: usize,
}

impl SessionReaper {
    pub fn new(registry: Arc<SessionRegistry>, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Run the sweep loop until the shutdown signal flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.reap_interval);
        // The first tick fires immediately; skip it so a restart does not
        // race fresh uploads against the orphan scan.
        interval.tick().await;

        info!(
            interval_secs = self.config.reap_interval.as_secs(),
            threshold_secs = self.config.reap_threshold.as_secs(),
            "Session reaper started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.sweep_once().await;
                    if report != SweepReport::default() {
                        info!(
                            sessions = report.sessions_reaped,
                            orphans = report.orphans_removed,
                            "Reaper sweep finished"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    info!("Session reaper stopping");
                    return;
                }
            }
        }
    }

    /// One sweep: evict idle sessions, then clear orphan directories.
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let threshold_secs = self.config.reap_threshold.as_secs() as i64;

        for id in self.registry.stale_sessions(threshold_secs).await {
            if let Some(session) = self.registry.remove(&id).await {
                info!(
                    session_id = %id,
                    status = %session.status,
                    idle_secs = session.idle_seconds(),
                    "Reaping idle session"
                );
                purge_session_dirs(&self.config, &id).await;
                report.sessions_reaped += 1;
            }
        }

        let live: Vec<SessionId> = self.registry.session_ids().await;
        for root in [&self.config.upload_root, &self.config.fragment_root] {
            report.orphans_removed += self.sweep_orphans(root, &live).await;
        }

        report
    }

    /// Remove subdirectories of `root` that have no live session and whose
    /// modification time is older than the reap threshold.
    async fn sweep_orphans(&self, root: &Path, live: &[SessionId]) -> usize {
        let mut removed = 0;

        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            // Missing root just means no uploads have happened yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(path = %root.display(), error = %e, "Orphan scan failed");
                return 0;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if live.iter().any(|id| id.as_str() == name) {
                continue;
            }

            match entry.metadata().await {
                Ok(meta) if meta.is_dir() && self.is_expired(meta.modified().ok()) => {
                    let path = entry.path();
                    match tokio::fs::remove_dir_all(&path).await {
                        Ok(()) => {
                            info!(path = %path.display(), "Removed orphan session directory");
                            removed += 1;
                        }
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Failed to remove orphan");
                        }
                    }
                }
                Ok(_) => debug!(name = %name, "Skipping non-expired entry"),
                Err(e) => warn!(name = %name, error = %e, "Failed to stat entry"),
            }
        }

        removed
    }

    fn is_expired(&self, modified: Option<SystemTime>) -> bool {
        match modified.and_then(|m| m.elapsed().ok()) {
            Some(age) => age > self.config.reap_threshold,
            // Unreadable mtime: leave the directory alone
            None => false,
        }
    }
}
