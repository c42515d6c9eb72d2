// MediaExtractor trait and common types

use std::path::PathBuf;

use async_trait::async_trait;

use super::profiles::NegotiationProfile;
use crate::downloader::errors::ToolError;
use crate::downloader::models::VideoMetadata;
use crate::downloader::progress::ProgressReporter;

/// Output file name template, relative to the output directory
pub const OUTPUT_TEMPLATE: &str = "%(title).200s.%(ext)s";

/// What to download and where
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub format_id: String,
    /// Run working directory; the file lands here under `OUTPUT_TEMPLATE`
    pub output_dir: PathBuf,
}

impl DownloadRequest {
    pub fn output_template(&self) -> PathBuf {
        self.output_dir.join(OUTPUT_TEMPLATE)
    }
}

/// Trait for media extractors
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Query metadata only; nothing is written to disk
    async fn fetch_metadata(
        &self,
        url: &str,
        profile: &NegotiationProfile,
    ) -> Result<VideoMetadata, ToolError>;

    /// Download one encoding into `request.output_dir`
    async fn download(
        &self,
        request: &DownloadRequest,
        profile: &NegotiationProfile,
        progress: ProgressReporter,
    ) -> Result<(), ToolError>;
}
