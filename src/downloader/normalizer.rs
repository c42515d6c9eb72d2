// MediaNormalizer - streamable MP4 via remux, re-encode as fallback

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use super::attempt::{first_success, Exhausted};
use super::errors::{LeechError, LeechResult};
use super::transcoder::{EncodeProfile, TranscodeJob, Transcoder};

/// Result of a successful normalization
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMedia {
    pub path: PathBuf,
    /// True when the remux path failed and the file was re-encoded
    pub reencoded: bool,
}

pub struct MediaNormalizer {
    transcoder: Arc<dyn Transcoder>,
    profile: EncodeProfile,
}

impl MediaNormalizer {
    pub fn new(transcoder: Arc<dyn Transcoder>, profile: EncodeProfile) -> Self {
        Self {
            transcoder,
            profile,
        }
    }

    /// Output lands next to the source as `{stem}.streamable.mp4`
    pub fn output_path(src: &Path) -> PathBuf {
        let stem = src
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());
        src.with_file_name(format!("{}.streamable.mp4", stem))
    }

    /// Remux, then re-encode; both failing is `NormalizationFailed`
    pub async fn normalize(&self, src: &Path) -> LeechResult<NormalizedMedia> {
        let dst = Self::output_path(src);
        let jobs = [
            TranscodeJob::Remux {
                src: src.to_path_buf(),
                dst: dst.clone(),
            },
            TranscodeJob::Reencode {
                src: src.to_path_buf(),
                dst: dst.clone(),
                profile: self.profile.clone(),
            },
        ];

        let transcoder = &self.transcoder;
        match first_success("normalize", &jobs, |job| transcoder.transcode(job)).await {
            Ok((idx, ())) => {
                let reencoded = idx > 0;
                info!(file = %dst.display(), reencoded, "normalized");
                Ok(NormalizedMedia {
                    path: dst,
                    reencoded,
                })
            }
            Err(Exhausted::Failed { last, .. }) => {
                // Drop whatever the last attempt left behind
                let _ = tokio::fs::remove_file(&dst).await;
                Err(LeechError::NormalizationFailed(last.to_string()))
            }
            Err(Exhausted::NoStrategies) => Err(LeechError::NormalizationFailed(
                "no normalization strategy".to_string(),
            )),
        }
    }
}
