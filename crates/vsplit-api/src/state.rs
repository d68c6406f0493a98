//! Application state.

use std::sync::Arc;

use vsplit_engine::{EngineConfig, JobContext, SessionRegistry};
use vsplit_media::{FfmpegSegmenter, Segmenter};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub engine: EngineConfig,
    pub registry: Arc<SessionRegistry>,
    pub segmenter: Arc<dyn Segmenter>,
}

impl AppState {
    /// Create new application state, ensuring the storage roots exist.
    pub async fn new(config: ApiConfig, engine: EngineConfig) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(&engine.upload_root).await?;
        tokio::fs::create_dir_all(&engine.fragment_root).await?;

        Ok(Self {
            config,
            engine,
            registry: Arc::new(SessionRegistry::new()),
            segmenter: Arc::new(FfmpegSegmenter::default()),
        })
    }

    /// Context handed to each spawned job worker.
    pub fn job_context(&self) -> JobContext {
        JobContext {
            registry: Arc::clone(&self.registry),
            segmenter: Arc::clone(&self.segmenter),
            fragment_root: self.engine.fragment_root.clone(),
        }
    }

    /// State backed by a caller-supplied segmenter (tests inject a fake).
    pub fn with_segmenter(
        config: ApiConfig,
        engine: EngineConfig,
        segmenter: Arc<dyn Segmenter>,
    ) -> Self {
        Self {
            config,
            engine,
            registry: Arc::new(SessionRegistry::new()),
            segmenter,
        }
    }
}
