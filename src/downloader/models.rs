// Common data models for the leech pipeline

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of the user who submitted a request (chat user id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequesterId(pub i64);

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One encoding reported by the extractor's metadata query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingCandidate {
    /// Extractor format id (e.g. "137", "hls-1080p")
    pub format_id: String,
    /// Vertical resolution; 0 when unknown
    pub height: u32,
    /// Exact or approximate size in bytes; 0 when unknown
    pub estimated_size_bytes: u64,
    /// Total bitrate in kbps; 0.0 when unknown
    pub bitrate_kbps: f64,
    /// False for audio-only encodings
    pub has_video: bool,
    pub ext: String,
    pub format_note: Option<String>,
}

impl EncodingCandidate {
    /// Ranking score within one height bucket
    pub fn score(&self) -> u64 {
        self.estimated_size_bytes
            .saturating_add((self.bitrate_kbps * 1024.0) as u64)
    }

    /// Label shown on the resolution choice
    pub fn label(&self) -> String {
        if self.height > 0 {
            format!("{}p", self.height)
        } else {
            self.format_note
                .clone()
                .filter(|note| !note.is_empty())
                .unwrap_or_else(|| "auto".to_string())
        }
    }
}

/// Metadata returned by the extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub id: String,
    pub title: String,
    pub duration_seconds: f64,
    pub formats: Vec<EncodingCandidate>,
}

/// Pending request context, owned by the session store
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub source_url: String,
    pub requester: RequesterId,
    pub created_at: DateTime<Utc>,
    /// Format ids that were offered to the requester
    pub offered_formats: Vec<String>,
}

impl Session {
    pub fn offers(&self, format_id: &str) -> bool {
        self.offered_formats.iter().any(|id| id == format_id)
    }
}

/// Resolution choice presented after a successful submit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatChoice {
    pub label: String,
    pub format_id: String,
    pub height: u32,
    pub estimated_size_bytes: u64,
}

impl From<&EncodingCandidate> for FormatChoice {
    fn from(candidate: &EncodingCandidate) -> Self {
        Self {
            label: candidate.label(),
            format_id: candidate.format_id.clone(),
            height: candidate.height,
            estimated_size_bytes: candidate.estimated_size_bytes,
        }
    }
}

/// Result of a successful submit: a live token plus the choices bound to it
#[derive(Debug, Clone)]
pub struct Submission {
    pub token: String,
    pub title: String,
    pub choices: Vec<FormatChoice>,
}

/// Pipeline run stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Extracting,
    Downloading,
    Normalizing,
    Splitting,
    Uploading,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extracting => "extracting",
            Self::Downloading => "downloading",
            Self::Normalizing => "normalizing",
            Self::Splitting => "splitting",
            Self::Uploading => "uploading",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub token: String,
    pub stage: Stage,
    pub parts_delivered: usize,
    pub total_bytes: u64,
}

/// One part handed to the delivery sink
#[derive(Debug, Clone)]
pub struct PartUpload {
    pub path: PathBuf,
    pub index: usize,
    pub total: usize,
    pub size_bytes: u64,
    pub caption: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(height: u32, note: Option<&str>) -> EncodingCandidate {
        EncodingCandidate {
            format_id: "f".to_string(),
            height,
            estimated_size_bytes: 10,
            bitrate_kbps: 2.5,
            has_video: true,
            ext: "mp4".to_string(),
            format_note: note.map(str::to_string),
        }
    }

    #[test]
    fn score_adds_bitrate_as_tie_break_proxy() {
        assert_eq!(candidate(720, None).score(), 10 + 2560);
    }

    #[test]
    fn score_saturates_on_absurd_sizes() {
        let mut huge = candidate(720, None);
        huge.estimated_size_bytes = u64::MAX;
        assert_eq!(huge.score(), u64::MAX);
    }

    #[test]
    fn label_falls_back_for_unknown_height() {
        assert_eq!(candidate(1080, None).label(), "1080p");
        assert_eq!(candidate(0, Some("hls")).label(), "hls");
        assert_eq!(candidate(0, Some("")).label(), "auto");
        assert_eq!(candidate(0, None).label(), "auto");
    }
}
