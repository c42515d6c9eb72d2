// ExtractionRetrier - walks the negotiation profiles until one gets through
//
// Metadata mode surfaces exhaustion as ExtractionFailed; download mode as
// DownloadFailed. Nothing from a failed attempt is kept, apart from whatever
// partial file the extractor left in the run directory, which the run's
// cleanup removes.

use std::sync::Arc;

use tracing::{info, warn};

use super::diagnostics::diagnose_error;
use super::profiles::NegotiationProfile;
use super::traits::{DownloadRequest, MediaExtractor};
use crate::downloader::attempt::{first_success, Exhausted};
use crate::downloader::errors::{LeechError, LeechResult, ToolError};
use crate::downloader::models::VideoMetadata;
use crate::downloader::progress::ProgressReporter;

pub struct ExtractionRetrier {
    extractor: Arc<dyn MediaExtractor>,
    profiles: Vec<NegotiationProfile>,
}

impl ExtractionRetrier {
    /// Retrier over the four standard profiles
    pub fn new(extractor: Arc<dyn MediaExtractor>) -> Self {
        Self::with_profiles(extractor, NegotiationProfile::standard())
    }

    pub fn with_profiles(
        extractor: Arc<dyn MediaExtractor>,
        profiles: Vec<NegotiationProfile>,
    ) -> Self {
        Self {
            extractor,
            profiles,
        }
    }

    /// Metadata-only mode
    pub async fn fetch_metadata(&self, url: &str) -> LeechResult<VideoMetadata> {
        let extractor = &self.extractor;
        let result = first_success("metadata", &self.profiles, |profile| async move {
            extractor.fetch_metadata(url, profile).await
        })
        .await;

        match result {
            Ok((idx, metadata)) => {
                info!(
                    extractor = extractor.name(),
                    profile = %self.profiles[idx],
                    title = %metadata.title,
                    "metadata resolved"
                );
                Ok(metadata)
            }
            Err(exhausted) => {
                let (attempts, cause) = self.unpack(exhausted);
                warn!(
                    attempts,
                    reason = diagnose_error(&cause.diagnostic_text()).map(|r| r.description()),
                    "every negotiation profile failed for metadata"
                );
                Err(LeechError::ExtractionFailed { attempts, cause })
            }
        }
    }

    /// Download mode; returns the profile that succeeded
    pub async fn download(
        &self,
        request: &DownloadRequest,
        progress: &ProgressReporter,
    ) -> LeechResult<NegotiationProfile> {
        let extractor = &self.extractor;
        let result = first_success("download", &self.profiles, |profile| {
            let progress = progress.clone();
            async move { extractor.download(request, profile, progress).await }
        })
        .await;

        match result {
            Ok((idx, ())) => Ok(self.profiles[idx].clone()),
            Err(exhausted) => {
                let (attempts, cause) = self.unpack(exhausted);
                warn!(attempts, error = %cause, "every negotiation profile failed for download");
                Err(LeechError::DownloadFailed(cause.to_string()))
            }
        }
    }

    fn unpack(&self, exhausted: Exhausted<ToolError>) -> (usize, ToolError) {
        match exhausted {
            Exhausted::Failed { attempts, last } => (attempts, last),
            Exhausted::NoStrategies => (
                0,
                ToolError::Spawn {
                    program: self.extractor.name().to_string(),
                    message: "no negotiation profiles configured".to_string(),
                },
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::progress::ProgressKind;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use tokio::sync::mpsc;

    /// Rejects the first `failures` calls, recording which profiles were tried
    struct FlakyExtractor {
        failures: usize,
        tried: Mutex<Vec<String>>,
    }

    impl FlakyExtractor {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                tried: Mutex::new(Vec::new()),
            })
        }

        fn attempt(&self, profile: &NegotiationProfile) -> Result<(), ToolError> {
            let mut tried = self.tried.lock();
            tried.push(profile.name().to_string());
            if tried.len() <= self.failures {
                Err(ToolError::Exit {
                    program: "yt-dlp".to_string(),
                    code: Some(1),
                    stderr: format!("HTTP Error 403: Forbidden ({})", profile.name()),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl MediaExtractor for FlakyExtractor {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn fetch_metadata(
            &self,
            _url: &str,
            profile: &NegotiationProfile,
        ) -> Result<VideoMetadata, ToolError> {
            self.attempt(profile)?;
            Ok(VideoMetadata {
                id: "id".to_string(),
                title: "title".to_string(),
                duration_seconds: 1.0,
                formats: Vec::new(),
            })
        }

        async fn download(
            &self,
            _request: &DownloadRequest,
            profile: &NegotiationProfile,
            _progress: ProgressReporter,
        ) -> Result<(), ToolError> {
            self.attempt(profile)
        }
    }

    #[tokio::test]
    async fn first_success_stops_the_sequence() {
        let extractor = FlakyExtractor::new(2);
        let retrier = ExtractionRetrier::new(extractor.clone());

        retrier.fetch_metadata("https://example.com").await.expect("metadata");

        assert_eq!(
            *extractor.tried.lock(),
            vec!["default", "impersonate", "browser-headers"]
        );
    }

    #[tokio::test]
    async fn exhaustion_carries_last_cause() {
        let extractor = FlakyExtractor::new(usize::MAX);
        let retrier = ExtractionRetrier::new(extractor.clone());

        let err = retrier
            .fetch_metadata("https://example.com")
            .await
            .expect_err("all profiles fail");

        match err {
            LeechError::ExtractionFailed { attempts, cause } => {
                assert_eq!(attempts, 4);
                assert!(cause.diagnostic_text().contains("(combined)"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(extractor.tried.lock().len(), 4);
    }

    #[tokio::test]
    async fn download_exhaustion_is_download_failed() {
        let extractor = FlakyExtractor::new(usize::MAX);
        let retrier = ExtractionRetrier::with_profiles(
            extractor,
            vec![NegotiationProfile::Default],
        );
        let (tx, _rx) = mpsc::channel(4);
        let progress = ProgressReporter::new("t:dl", "clip", ProgressKind::Downloading, tx);
        let request = DownloadRequest {
            url: "https://example.com".to_string(),
            format_id: "18".to_string(),
            output_dir: PathBuf::from("/tmp"),
        };

        let err = retrier.download(&request, &progress).await.expect_err("fails");

        assert!(matches!(err, LeechError::DownloadFailed(ref m) if m.contains("403")));
    }

    #[tokio::test]
    async fn download_reports_winning_profile() {
        let extractor = FlakyExtractor::new(1);
        let retrier = ExtractionRetrier::new(extractor);
        let (tx, _rx) = mpsc::channel(4);
        let progress = ProgressReporter::new("t:dl", "clip", ProgressKind::Downloading, tx);
        let request = DownloadRequest {
            url: "https://example.com".to_string(),
            format_id: "18".to_string(),
            output_dir: PathBuf::from("/tmp"),
        };

        let profile = retrier.download(&request, &progress).await.expect("download");

        assert_eq!(profile.name(), "impersonate");
    }
}
