// Transcoder boundary - ffmpeg for jobs, ffprobe for inspection
//
// Exit status is the only success signal. Container internals are never
// inspected here; ffmpeg's stderr is kept on failure for diagnostics.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::errors::ToolError;
use super::utils::{run_checked, run_output_with_timeout};

const PROBE_TIMEOUT_SECS: u64 = 60;

/// Fixed-quality re-encode settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeProfile {
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for EncodeProfile {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 23,
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeJob {
    /// Stream copy with the index moved to the front
    Remux { src: PathBuf, dst: PathBuf },
    /// Full re-encode to a known-good codec pair
    Reencode {
        src: PathBuf,
        dst: PathBuf,
        profile: EncodeProfile,
    },
    /// Stream-copy extraction of one time window
    Window {
        src: PathBuf,
        dst: PathBuf,
        start_secs: u64,
        duration_secs: u64,
    },
}

impl TranscodeJob {
    pub fn dst(&self) -> &Path {
        match self {
            Self::Remux { dst, .. } | Self::Reencode { dst, .. } | Self::Window { dst, .. } => dst,
        }
    }
}

impl fmt::Display for TranscodeJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remux { .. } => write!(f, "remux"),
            Self::Reencode { .. } => write!(f, "re-encode"),
            Self::Window {
                start_secs,
                duration_secs,
                ..
            } => write!(f, "window {}+{}s", start_secs, duration_secs),
        }
    }
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, job: &TranscodeJob) -> Result<(), ToolError>;

    /// Duration in seconds; 0.0 when it cannot be determined
    async fn probe_duration(&self, path: &Path) -> f64;
}

pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// ffmpeg argv for a job
    pub fn job_args(job: &TranscodeJob) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];

        match job {
            TranscodeJob::Remux { src, .. } => {
                args.push("-i".to_string());
                args.push(path_arg(src));
                args.extend(["-c", "copy"].map(String::from));
            }
            TranscodeJob::Reencode { src, profile, .. } => {
                args.push("-i".to_string());
                args.push(path_arg(src));
                args.extend([
                    "-c:v".to_string(),
                    profile.video_codec.clone(),
                    "-preset".to_string(),
                    profile.preset.clone(),
                    "-crf".to_string(),
                    profile.crf.to_string(),
                    "-c:a".to_string(),
                    profile.audio_codec.clone(),
                    "-b:a".to_string(),
                    profile.audio_bitrate.clone(),
                ]);
            }
            TranscodeJob::Window {
                src,
                start_secs,
                duration_secs,
                ..
            } => {
                // Input seeking: -ss before -i
                args.push("-ss".to_string());
                args.push(start_secs.to_string());
                args.push("-i".to_string());
                args.push(path_arg(src));
                args.push("-t".to_string());
                args.push(duration_secs.to_string());
                args.extend(["-c", "copy"].map(String::from));
            }
        }

        args.extend(["-movflags", "+faststart"].map(String::from));
        args.push(path_arg(job.dst()));
        args
    }

    fn probe_args(entry: &str, path: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-v", "error"].map(String::from).to_vec();
        if entry.starts_with("stream") {
            args.extend(["-select_streams", "v:0"].map(String::from));
        }
        args.extend([
            "-show_entries".to_string(),
            entry.to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path_arg(path),
        ]);
        args
    }

    async fn probe_entry(&self, entry: &str, path: &Path) -> Option<f64> {
        let output = run_output_with_timeout(
            &self.ffprobe_path,
            Self::probe_args(entry, path),
            Some(PROBE_TIMEOUT_SECS),
        )
        .await
        .ok()?;
        if !output.status.success() {
            return None;
        }
        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// First positive number in ffprobe output; "N/A" and blanks are skipped
pub fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .filter_map(|l| l.trim().parse::<f64>().ok())
        .find(|d| d.is_finite() && *d > 0.0)
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, job: &TranscodeJob) -> Result<(), ToolError> {
        debug!(job = %job, dst = %job.dst().display(), "running ffmpeg");
        // Transcodes may take hours; cancellation drops the child instead
        run_checked(&self.ffmpeg_path, Self::job_args(job), None).await?;
        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> f64 {
        // Stream duration first, container duration as fallback
        match self.probe_entry("stream=duration", path).await {
            Some(d) => d,
            None => self
                .probe_entry("format=duration", path)
                .await
                .unwrap_or(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tail(args: &[String], n: usize) -> Vec<&str> {
        args[args.len() - n..].iter().map(String::as_str).collect()
    }

    #[test]
    fn remux_is_stream_copy_with_faststart() {
        let args = FfmpegTranscoder::job_args(&TranscodeJob::Remux {
            src: PathBuf::from("/w/in.webm"),
            dst: PathBuf::from("/w/in.streamable.mp4"),
        });

        assert_eq!(
            tail(&args, 7),
            vec![
                "-i",
                "/w/in.webm",
                "-c",
                "copy",
                "-movflags",
                "+faststart",
                "/w/in.streamable.mp4"
            ]
        );
        assert!(!args.contains(&"-c:v".to_string()));
    }

    #[test]
    fn reencode_uses_profile() {
        let args = FfmpegTranscoder::job_args(&TranscodeJob::Reencode {
            src: PathBuf::from("in.mkv"),
            dst: PathBuf::from("out.mp4"),
            profile: EncodeProfile::default(),
        });
        let joined = args.join(" ");

        assert!(joined.contains(
            "-i in.mkv -c:v libx264 -preset veryfast -crf 23 -c:a aac -b:a 128k -movflags +faststart out.mp4"
        ));
    }

    #[test]
    fn window_seeks_before_input() {
        let args = FfmpegTranscoder::job_args(&TranscodeJob::Window {
            src: PathBuf::from("in.mp4"),
            dst: PathBuf::from("in.part02.mp4"),
            start_secs: 1754,
            duration_secs: 1754,
        });

        assert!(args
            .join(" ")
            .ends_with("-ss 1754 -i in.mp4 -t 1754 -c copy -movflags +faststart in.part02.mp4"));
    }

    #[test]
    fn probe_args_select_first_video_stream() {
        let args = FfmpegTranscoder::probe_args("stream=duration", Path::new("a.mp4"));
        assert_eq!(
            args.join(" "),
            "-v error -select_streams v:0 -show_entries stream=duration -of default=noprint_wrappers=1:nokey=1 a.mp4"
        );

        let fallback = FfmpegTranscoder::probe_args("format=duration", Path::new("a.mp4"));
        assert!(!fallback.contains(&"-select_streams".to_string()));
    }

    #[test]
    fn duration_parsing_skips_unknown_values() {
        assert_eq!(parse_duration("3600.040000\n"), Some(3600.04));
        assert_eq!(parse_duration("N/A\n12.5\n"), Some(12.5));
        assert_eq!(parse_duration("N/A\n"), None);
        assert_eq!(parse_duration("0.000000"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[tokio::test]
    async fn missing_ffprobe_probes_zero() {
        let transcoder = FfmpegTranscoder::new("ffmpeg", "/nonexistent/ffprobe-xyz");
        assert_eq!(transcoder.probe_duration(Path::new("x.mp4")).await, 0.0);
    }
}
