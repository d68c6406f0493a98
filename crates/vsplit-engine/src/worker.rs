//! Job worker.
//!
//! Runs one split job to completion on its own task: probes the source,
//! plans the segments, drives the segmenter one fragment at a time, and
//! mirrors every result into the registry and the progress channel.
//!
//! Terminal guarantee: exactly one of `Completed` or `Failed` reaches the
//! channel on every exit path, including panics inside the segment loop.
//! The stream layer must never hang waiting on a crashed worker.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::FutureExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

use vsplit_media::{plan_segments, MediaError, SegmentRequest, Segmenter};
use vsplit_models::{Fragment, Session, SessionError, SessionId};

use crate::channel::ProgressSender;
use crate::registry::SessionRegistry;

/// Everything a worker needs besides the session itself.
#[derive(Clone)]
pub struct JobContext {
    pub registry: Arc<SessionRegistry>,
    pub segmenter: Arc<dyn Segmenter>,
    /// Root directory fragments are written under (one subdir per session)
    pub fragment_root: PathBuf,
}

/// Why a job failed.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Could not read the source video; it may be corrupt or incomplete")]
    SourceUnreadable(#[source] MediaError),

    #[error(
        "Encoding fragment {} failed; check that ffmpeg is installed and reachable on PATH",
        .index + 1
    )]
    SegmentEncodeFailed {
        index: u32,
        #[source]
        source: MediaError,
    },

    #[error("Internal error while processing the video")]
    Internal(String),
}

impl JobError {
    /// Internal diagnostic, never shown to the client.
    fn detail(&self) -> String {
        match self {
            JobError::SourceUnreadable(e) => format!("probe failed: {e}"),
            JobError::SegmentEncodeFailed { index, source } => {
                format!("segment {index} encode failed: {source}")
            }
            JobError::Internal(detail) => detail.clone(),
        }
    }
}

/// Spawn a job worker for the given session.
///
/// The request path returns as soon as this is called; the worker runs to
/// completion regardless of whether anyone consumes the progress stream.
pub fn spawn_job(ctx: JobContext, session: Session, progress: ProgressSender) -> JoinHandle<()> {
    tokio::spawn(run_job(ctx, session, progress))
}

/// Run one job to its terminal state.
pub async fn run_job(ctx: JobContext, session: Session, progress: ProgressSender) {
    let session_id = session.id.clone();
    info!(session_id = %session_id, "Job started");

    ctx.registry.set_running(&session_id).await;

    let outcome = AssertUnwindSafe(run_segments(&ctx, &session, &progress))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(fragment_count)) => {
            ctx.registry.set_succeeded(&session_id).await;
            progress.progress(100.0).await;
            progress.completed().await;
            info!(
                session_id = %session_id,
                fragments = fragment_count,
                "Job completed"
            );
        }
        Ok(Err(job_error)) => {
            fail_job(&ctx, &session_id, &progress, &job_error).await;
        }
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            let job_error = JobError::Internal(detail);
            fail_job(&ctx, &session_id, &progress, &job_error).await;
        }
    }
}

async fn fail_job(
    ctx: &JobContext,
    session_id: &SessionId,
    progress: &ProgressSender,
    job_error: &JobError,
) {
    let message = job_error.to_string();
    let detail = job_error.detail();
    error!(session_id = %session_id, detail = %detail, "Job failed: {}", message);

    ctx.registry
        .set_failed(session_id, SessionError::with_detail(&message, detail))
        .await;
    progress.failed(message).await;
}

/// The segment loop. Returns the number of fragments produced.
async fn run_segments(
    ctx: &JobContext,
    session: &Session,
    progress: &ProgressSender,
) -> Result<usize, JobError> {
    let total_duration = ctx
        .segmenter
        .probe_duration(&session.source_path)
        .await
        .map_err(JobError::SourceUnreadable)?;

    let spans = plan_segments(total_duration, session.segment_duration);
    let total = spans.len();

    progress
        .info(format!(
            "Source is {:.2}s long; producing {} fragment{}",
            total_duration,
            total,
            if total == 1 { "" } else { "s" }
        ))
        .await;

    let extension = session
        .source_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4")
        .to_string();

    let fragment_dir = ctx.fragment_root.join(session.id.as_str());
    tokio::fs::create_dir_all(&fragment_dir)
        .await
        .map_err(|e| JobError::Internal(format!("failed to create fragment dir: {e}")))?;

    for span in spans {
        let number = span.index + 1;
        progress
            .info(format!("Processing fragment {number} of {total}"))
            .await;

        let filename = format!("fragment_{number}.{extension}");
        let output = fragment_dir.join(&filename);
        let request = SegmentRequest::new(&session.source_path, span.start, span.end, &output);

        // Per-segment encode progress, fed straight from ffmpeg's reports
        let segment_progress = progress.clone();
        let segment_len = span.duration();
        let on_progress = Box::new(move |p: vsplit_media::EncodeProgress| {
            segment_progress.segment_progress(p.percent_of(segment_len));
        });

        ctx.segmenter
            .encode_segment(&request, on_progress)
            .await
            .map_err(|source| JobError::SegmentEncodeFailed {
                index: span.index,
                source,
            })?;

        let fragment = Fragment::new(&session.id, number, filename);
        ctx.registry
            .append_fragment(&session.id, fragment.clone())
            .await;
        progress.fragment_ready(fragment).await;
        progress
            .progress(number as f32 / total as f32 * 100.0)
            .await;
    }

    Ok(total)
}
