//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Encode progress parsed from FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default)]
pub struct EncodeProgress {
    /// Output timestamp in milliseconds
    pub out_time_ms: i64,
    /// Processing speed relative to realtime (e.g. 1.5)
    pub speed: f32,
    /// Whether FFmpeg reported `progress=end`
    pub is_complete: bool,
}

impl EncodeProgress {
    /// Percent of an encode of the given duration, clamped to 0-100.
    pub fn percent_of(&self, duration_secs: f64) -> f32 {
        if duration_secs <= 0.0 {
            return 0.0;
        }
        let done = self.out_time_ms as f64 / 1000.0;
        ((done / duration_secs) * 100.0).clamp(0.0, 100.0) as f32
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command. Output is always overwritten.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Set seek position (before input, fast seek).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Set output duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set encoder preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
            // Progress key=value output to stderr
            "-progress".to_string(),
            "pipe:2".to_string(),
        ];

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress reporting.
#[derive(Debug, Default)]
pub struct FfmpegRunner;

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command, invoking the callback on each progress block.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, on_progress: F) -> MediaResult<()>
    where
        F: Fn(EncodeProgress) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;
        let mut reader = BufReader::new(stderr).lines();

        // Progress parsing shares the stderr stream with error output, so
        // non key=value lines are collected for diagnostics.
        let parse_task = tokio::spawn(async move {
            let mut current = EncodeProgress::default();
            let mut error_lines: Vec<String> = Vec::new();

            while let Ok(Some(line)) = reader.next_line().await {
                match parse_progress_line(&line, &mut current) {
                    ParsedLine::Block => on_progress(current.clone()),
                    ParsedLine::Key => {}
                    ParsedLine::Other => {
                        if !line.trim().is_empty() {
                            error_lines.push(line);
                        }
                    }
                }
            }

            error_lines
        });

        let status = child.wait().await?;
        let error_lines = parse_task.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            let stderr = if error_lines.is_empty() {
                None
            } else {
                Some(error_lines.join("\n"))
            };
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                stderr,
                status.code(),
            ))
        }
    }
}

enum ParsedLine {
    /// End of a progress block; callback should fire
    Block,
    /// A recognized progress key
    Key,
    /// Anything else (likely error output)
    Other,
}

/// Parse one line of FFmpeg's `-progress` output into the running state.
fn parse_progress_line(line: &str, current: &mut EncodeProgress) -> ParsedLine {
    let line = line.trim();

    if let Some((key, value)) = line.split_once('=') {
        match key {
            "out_time_ms" | "out_time_us" => {
                // Despite the name, both keys are microseconds on modern builds.
                if let Ok(us) = value.parse::<i64>() {
                    current.out_time_ms = us / 1000;
                }
                ParsedLine::Key
            }
            "speed" => {
                if value != "N/A" {
                    if let Some(speed) = value.strip_suffix('x').and_then(|s| s.parse().ok()) {
                        current.speed = speed;
                    }
                }
                ParsedLine::Key
            }
            "progress" => {
                if value == "end" {
                    current.is_complete = true;
                }
                ParsedLine::Block
            }
            // Remaining progress keys (frame, fps, bitrate, ...) are not used
            "frame" | "fps" | "bitrate" | "total_size" | "out_time" | "dup_frames"
            | "drop_frames" | "stream_0_0_q" => ParsedLine::Key,
            _ => ParsedLine::Other,
        }
    } else {
        ParsedLine::Other
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(10.0)
            .duration(30.0)
            .video_codec("libx264")
            .crf(23);

        let args = cmd.build_args();
        assert!(args.contains(&"-ss".to_string()));
        assert!(args.contains(&"10.000".to_string()));
        assert!(args.contains(&"-t".to_string()));
        assert!(args.contains(&"-c:v".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        // Seek must come before -i
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < i);
    }

    #[test]
    fn test_progress_parsing() {
        let mut progress = EncodeProgress::default();

        parse_progress_line("out_time_ms=5000000", &mut progress);
        assert_eq!(progress.out_time_ms, 5000);

        parse_progress_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        assert!(matches!(
            parse_progress_line("progress=continue", &mut progress),
            ParsedLine::Block
        ));
        assert!(!progress.is_complete);

        parse_progress_line("progress=end", &mut progress);
        assert!(progress.is_complete);
    }

    #[test]
    fn test_percent_of() {
        let progress = EncodeProgress {
            out_time_ms: 30_000,
            ..Default::default()
        };
        assert!((progress.percent_of(60.0) - 50.0).abs() < 0.01);
        assert!((progress.percent_of(0.0)).abs() < f32::EPSILON);
        // Never exceeds 100 even if ffmpeg overshoots
        assert!((progress.percent_of(10.0) - 100.0).abs() < 0.01);
    }
}
