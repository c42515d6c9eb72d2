// Error types for the leech pipeline

use std::path::PathBuf;

use thiserror::Error;

use super::extractors::diagnose_error;
use crate::config::ConfigError;

/// Failure of an external program (yt-dlp, ffmpeg, ffprobe)
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// Binary could not be located
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Process could not be started or its pipes could not be read
    #[error("failed to run {program}: {message}")]
    Spawn { program: String, message: String },

    /// Non-zero exit status; stderr is kept for diagnostics
    #[error("{program} exited with {}: {}", display_code(.code), last_lines(.stderr, 3))]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} timed out after {secs}s")]
    TimedOut { program: String, secs: u64 },

    /// Output of a successful run could not be understood
    #[error("parse error: {0}")]
    Parse(String),
}

impl ToolError {
    /// Raw diagnostic text, used for blocking-reason detection
    pub fn diagnostic_text(&self) -> String {
        match self {
            Self::Exit { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "signal".to_string(),
    }
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join(" | ")
}

/// Pipeline error taxonomy
#[derive(Debug, Error)]
pub enum LeechError {
    /// Every negotiation profile was rejected by the content host
    #[error("extraction failed after {attempts} attempt(s): {cause}")]
    ExtractionFailed { attempts: usize, cause: ToolError },

    /// Metadata resolved but no selectable video encoding remained
    #[error("no video formats available")]
    NoFormatsAvailable,

    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// Both the remux and the re-encode path failed
    #[error("normalization failed: {0}")]
    NormalizationFailed(String),

    #[error("split failed: {0}")]
    SplitFailed(String),

    #[error("upload of part {part}/{total} failed: {cause}")]
    UploadFailed {
        part: usize,
        total: usize,
        cause: String,
    },

    #[error("session {0} not found or expired")]
    SessionNotFound(String),

    #[error("session {0} already has a run in flight")]
    SessionBusy(String),

    #[error("format {0} was not offered for this session")]
    FormatNotOffered(String),

    #[error("cancelled")]
    Cancelled,

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LeechError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short human-readable cause for the requester
    pub fn user_message(&self) -> String {
        match self {
            Self::ExtractionFailed { cause, .. } => {
                let reason = diagnose_error(&cause.diagnostic_text());
                match reason {
                    Some(reason) => format!("Could not fetch formats: {}", reason.description()),
                    None => format!("Could not fetch formats: {}", cause),
                }
            }
            Self::NoFormatsAvailable => "No video formats found.".to_string(),
            Self::DownloadFailed(cause) => match diagnose_error(cause) {
                Some(reason) => format!("Download failed: {}", reason.description()),
                None => format!("Download failed: {}", cause),
            },
            Self::NormalizationFailed(cause) => {
                format!("Remux & re-encode both failed: {}", cause)
            }
            Self::SplitFailed(cause) => format!("Splitting failed: {}", cause),
            Self::UploadFailed { part, total, cause } => {
                format!("Upload failed for part {}/{}: {}", part, total, cause)
            }
            Self::SessionNotFound(_) => "Session expired.".to_string(),
            Self::SessionBusy(_) => "This request is already being processed.".to_string(),
            Self::FormatNotOffered(id) => format!("Format {} is not available.", id),
            Self::Cancelled => "Cancelled.".to_string(),
            Self::Io { .. } | Self::Config(_) => format!("Internal error: {}", self),
        }
    }
}

pub type LeechResult<T> = Result<T, LeechError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_error_keeps_tail_of_stderr() {
        let err = ToolError::Exit {
            program: "ffmpeg".to_string(),
            code: Some(1),
            stderr: "banner\n\nline a\nline b\nInvalid data found\n".to_string(),
        };
        let text = err.to_string();
        assert!(text.starts_with("ffmpeg exited with code 1"));
        assert!(text.ends_with("line a | line b | Invalid data found"));
        assert!(!text.contains("banner"));
    }

    #[test]
    fn extraction_failure_names_the_blocking_reason() {
        let err = LeechError::ExtractionFailed {
            attempts: 4,
            cause: ToolError::Exit {
                program: "yt-dlp".to_string(),
                code: Some(1),
                stderr: "ERROR: HTTP Error 429: Too Many Requests".to_string(),
            },
        };
        assert_eq!(
            err.user_message(),
            "Could not fetch formats: Rate limited by the host"
        );
    }

    #[test]
    fn upload_failure_message_names_the_part() {
        let err = LeechError::UploadFailed {
            part: 2,
            total: 3,
            cause: "connection reset".to_string(),
        };
        assert_eq!(
            err.user_message(),
            "Upload failed for part 2/3: connection reset"
        );
    }
}
