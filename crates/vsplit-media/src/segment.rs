//! Segment planning and the transcoder capability boundary.
//!
//! The worker never talks to ffmpeg directly; it drives a `Segmenter`,
//! which keeps the job engine testable without a transcoder installed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::command::{EncodeProgress, FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::probe_duration;

/// One planned time slice of the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSpan {
    /// 0-based segment index
    pub index: u32,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds, clamped to the source duration
    pub end: f64,
}

impl SegmentSpan {
    /// Length of this span in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Plan fixed-duration segments over a source of the given total length.
///
/// Produces `ceil(total / segment)` spans; the final span is clamped so a
/// segment never extends past the end of the source. Non-positive inputs
/// yield an empty plan.
pub fn plan_segments(total_duration: f64, segment_duration: f64) -> Vec<SegmentSpan> {
    if total_duration <= 0.0 || segment_duration <= 0.0 {
        return Vec::new();
    }

    let count = (total_duration / segment_duration).ceil() as u32;
    (0..count)
        .map(|index| {
            let start = index as f64 * segment_duration;
            let end = (start + segment_duration).min(total_duration);
            SegmentSpan { index, start, end }
        })
        .collect()
}

/// Request to encode a single segment.
#[derive(Debug, Clone)]
pub struct SegmentRequest {
    /// Path to the source media
    pub source: PathBuf,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Where to write the fragment
    pub output: PathBuf,
}

impl SegmentRequest {
    pub fn new(
        source: impl AsRef<Path>,
        start: f64,
        end: f64,
        output: impl AsRef<Path>,
    ) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            start,
            end,
            output: output.as_ref().to_path_buf(),
        }
    }
}

/// The transcoder capability consumed by the job engine.
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Duration of the source in seconds, or an error if unreadable.
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64>;

    /// Encode one segment, reporting encode progress through the callback.
    async fn encode_segment(
        &self,
        request: &SegmentRequest,
        on_progress: Box<dyn Fn(EncodeProgress) + Send + 'static>,
    ) -> MediaResult<()>;
}

/// FFmpeg-backed segmenter.
///
/// Re-encodes each slice with libx264/aac. No `-r` flag is passed: the
/// output frame rate is inherited from the source.
#[derive(Debug, Clone)]
pub struct FfmpegSegmenter {
    /// x264 preset
    pub preset: String,
    /// x264 CRF quality
    pub crf: u8,
    /// Audio bitrate
    pub audio_bitrate: String,
}

impl Default for FfmpegSegmenter {
    fn default() -> Self {
        Self {
            preset: "veryfast".to_string(),
            crf: 23,
            audio_bitrate: "128k".to_string(),
        }
    }
}

#[async_trait]
impl Segmenter for FfmpegSegmenter {
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        probe_duration(path).await
    }

    async fn encode_segment(
        &self,
        request: &SegmentRequest,
        on_progress: Box<dyn Fn(EncodeProgress) + Send + 'static>,
    ) -> MediaResult<()> {
        info!(
            "Encoding segment: {} -> {} ({:.2}s - {:.2}s)",
            request.source.display(),
            request.output.display(),
            request.start,
            request.end
        );

        let cmd = FfmpegCommand::new(&request.source, &request.output)
            .seek(request.start)
            .duration(request.end - request.start)
            .video_codec("libx264")
            .preset(&self.preset)
            .crf(self.crf)
            .audio_codec("aac")
            .audio_bitrate(&self.audio_bitrate);

        FfmpegRunner::new().run_with_progress(&cmd, on_progress).await
    }
}
