// CLI MediaExtractor - drives the native `yt-dlp` binary
//
// Metadata comes from `--dump-json`. Downloads run with `--newline` and a
// machine-readable `--progress-template`, so byte counts are exact instead of
// being scraped from the human progress line.

use std::process::Stdio;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info};

use super::profiles::NegotiationProfile;
use super::traits::{DownloadRequest, MediaExtractor};
use crate::downloader::errors::ToolError;
use crate::downloader::models::{EncodingCandidate, VideoMetadata};
use crate::downloader::progress::ProgressReporter;
use crate::downloader::utils::run_checked;

const PROGRESS_TAG: &str = "LEECH";

/// Fields: downloaded, total, total estimate, speed, eta, status
const PROGRESS_TEMPLATE: &str = "download:LEECH %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s %(progress.speed)s %(progress.eta)s %(progress.status)s";

/// CLI-based extractor using the yt-dlp binary
pub struct YtDlpExtractor {
    ytdlp_path: String,
    metadata_timeout_secs: u64,
}

impl YtDlpExtractor {
    pub fn new(ytdlp_path: impl Into<String>, metadata_timeout_secs: u64) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            metadata_timeout_secs,
        }
    }

    fn metadata_args(url: &str, profile: &NegotiationProfile) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--skip-download".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];
        args.extend(profile.to_args());
        args.push(url.to_string());
        args
    }

    fn download_args(request: &DownloadRequest, profile: &NegotiationProfile) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            request.format_id.clone(),
            "-o".to_string(),
            request.output_template().to_string_lossy().to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--newline".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
        ];
        args.extend(profile.to_args());
        args.push(request.url.clone());
        args
    }

    /// Parse `--dump-json` output
    fn parse_json(stdout: &[u8]) -> Result<VideoMetadata, ToolError> {
        let raw: RawInfo = serde_json::from_slice(stdout)
            .map_err(|e| ToolError::Parse(format!("Invalid JSON: {}", e)))?;

        Ok(VideoMetadata {
            id: raw.id.unwrap_or_else(|| "unknown".to_string()),
            title: raw.title.unwrap_or_else(|| "Unknown".to_string()),
            duration_seconds: raw.duration.unwrap_or(0.0),
            formats: raw.formats.into_iter().map(EncodingCandidate::from).collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    #[serde(default)]
    format_id: String,
    ext: Option<String>,
    height: Option<u32>,
    vcodec: Option<String>,
    // Sizes occasionally arrive as floats
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
    tbr: Option<f64>,
    format_note: Option<String>,
}

impl From<RawFormat> for EncodingCandidate {
    fn from(f: RawFormat) -> Self {
        Self {
            format_id: f.format_id,
            height: f.height.unwrap_or(0),
            estimated_size_bytes: f.filesize.or(f.filesize_approx).unwrap_or(0.0).max(0.0) as u64,
            bitrate_kbps: f.tbr.unwrap_or(0.0),
            has_video: f.vcodec.as_deref() != Some("none"),
            ext: f.ext.unwrap_or_default(),
            format_note: f.format_note,
        }
    }
}

/// One parsed line of the progress template
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressLine {
    pub downloaded: u64,
    pub total: u64,
    pub speed: f64,
    pub eta: Option<u64>,
    pub finished: bool,
}

/// Parse a progress-template line; other yt-dlp output yields `None`
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    lazy_static::lazy_static! {
        static ref PROGRESS_RE: Regex = Regex::new(
            r"^LEECH\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s*$"
        ).unwrap();
    }

    let line = line.trim();
    if !line.starts_with(PROGRESS_TAG) {
        return None;
    }
    let caps = PROGRESS_RE.captures(line)?;

    // yt-dlp prints "NA" for unknown fields
    let num = |idx: usize| -> Option<f64> {
        caps.get(idx)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
    };

    let downloaded = num(1).unwrap_or(0.0) as u64;
    let total = num(2).or_else(|| num(3)).unwrap_or(0.0) as u64;
    let status = caps.get(6).map(|m| m.as_str()).unwrap_or("");

    Some(ProgressLine {
        downloaded,
        total,
        speed: num(4).unwrap_or(0.0),
        eta: num(5).map(|v| v as u64),
        finished: status == "finished",
    })
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch_metadata(
        &self,
        url: &str,
        profile: &NegotiationProfile,
    ) -> Result<VideoMetadata, ToolError> {
        let args = Self::metadata_args(url, profile);
        let output = run_checked(&self.ytdlp_path, args, Some(self.metadata_timeout_secs)).await?;
        let metadata = Self::parse_json(&output.stdout)?;
        debug!(
            id = %metadata.id,
            formats = metadata.formats.len(),
            profile = %profile,
            "metadata fetched"
        );
        Ok(metadata)
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        profile: &NegotiationProfile,
        progress: ProgressReporter,
    ) -> Result<(), ToolError> {
        let args = Self::download_args(request, profile);
        info!(format = %request.format_id, profile = %profile, "starting yt-dlp download");

        let spawn_err = |message: String| ToolError::Spawn {
            program: self.ytdlp_path.clone(),
            message,
        };

        let mut child = TokioCommand::new(&self.ytdlp_path)
            .args(&args)
            .current_dir(&request.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ToolError::NotFound(self.ytdlp_path.clone()),
                _ => spawn_err(e.to_string()),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_err("failed to capture stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_err("failed to capture stderr".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| spawn_err(format!("failed to read stdout: {}", e)))?
        {
            match parse_progress_line(&line) {
                Some(p) if p.finished => progress.finished(p.total.max(p.downloaded)),
                Some(p) => progress.report_with_rate(p.downloaded, p.total, p.speed, p.eta),
                None => {
                    if line.contains("[Merger]") || line.contains("Destination") {
                        debug!("[yt-dlp] {}", line);
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| spawn_err(format!("failed to wait: {}", e)))?;
        let stderr = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(ToolError::Exit {
                program: self.ytdlp_path.clone(),
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).to_string(),
            })
        }
    }
}
