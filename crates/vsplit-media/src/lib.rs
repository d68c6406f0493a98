//! FFmpeg CLI wrapper for the vsplit backend.
//!
//! Provides the transcoder boundary consumed by the job engine:
//! - `probe_media` / `probe_duration` via ffprobe
//! - `FfmpegCommand` / `FfmpegRunner` process plumbing with progress parsing
//! - `Segmenter` capability trait, `FfmpegSegmenter` implementation, and
//!   `plan_segments` boundary math

pub mod command;
pub mod error;
pub mod probe;
pub mod segment;

pub use command::{check_ffmpeg, check_ffprobe, EncodeProgress, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_duration, probe_media, MediaInfo};
pub use segment::{plan_segments, FfmpegSegmenter, SegmentRequest, SegmentSpan, Segmenter};
