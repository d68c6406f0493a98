//! Job engine: session registry, progress channels, the split worker and
//! the background reaper.

pub mod channel;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod reaper;
pub mod registry;
pub mod worker;

pub use channel::ProgressSender;
pub use cleanup::{purge_session_dirs, schedule_source_cleanup};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use reaper::{SessionReaper, SweepReport};
pub use registry::SessionRegistry;
pub use worker::{spawn_job, JobContext, JobError};
