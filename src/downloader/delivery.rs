// Delivery sink trait definition
//
// The chat platform sits behind this trait: status edits to the requester,
// part attachments with byte progress, the operational log channel and
// stage transitions.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;

use super::models::{PartUpload, RequesterId, Stage};
use super::progress::ProgressReporter;

const COPY_CHUNK_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The platform refused the attachment
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Trait for delivery sink implementations
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Status text for the requester; best effort
    async fn notify(&self, requester: RequesterId, text: &str);

    /// Send one part, reporting `(bytes_sent, total_bytes)` as it goes
    async fn deliver(
        &self,
        requester: RequesterId,
        part: &PartUpload,
        progress: ProgressReporter,
    ) -> Result<(), DeliveryError>;

    /// Operational log channel; best effort
    async fn log(&self, text: &str);

    /// Run entered `stage`; platforms without a stage indicator ignore it
    async fn stage_changed(&self, _requester: RequesterId, _token: &str, _stage: Stage) {}
}

/// Delivers parts by copying them into a local directory
pub struct DirectorySink {
    out_dir: PathBuf,
}

impl DirectorySink {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }
}

#[async_trait]
impl DeliverySink for DirectorySink {
    async fn notify(&self, requester: RequesterId, text: &str) {
        info!(requester = %requester, "{}", text);
    }

    async fn deliver(
        &self,
        _requester: RequesterId,
        part: &PartUpload,
        progress: ProgressReporter,
    ) -> Result<(), DeliveryError> {
        let name = part
            .path
            .file_name()
            .ok_or_else(|| DeliveryError::Rejected("part has no file name".to_string()))?;
        tokio::fs::create_dir_all(&self.out_dir).await?;
        let dst = self.out_dir.join(name);

        let mut src = tokio::fs::File::open(&part.path).await?;
        let total = src.metadata().await?.len();
        let mut out = tokio::fs::File::create(&dst).await?;

        let mut buf = vec![0u8; COPY_CHUNK_BYTES];
        let mut sent = 0u64;
        loop {
            let n = src.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).await?;
            sent += n as u64;
            progress.report(sent, total);
        }
        out.flush().await?;

        info!(part = part.index, total = part.total, dst = %dst.display(), "part delivered");
        Ok(())
    }

    async fn log(&self, text: &str) {
        info!(target: "leech::oplog", "{}", text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::progress::ProgressKind;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn directory_sink_copies_and_reports_progress() {
        let work = tempfile::tempdir().expect("tempdir");
        let out = tempfile::tempdir().expect("tempdir");
        let src = work.path().join("clip.part01.mp4");
        std::fs::write(&src, vec![7u8; COPY_CHUNK_BYTES + 10]).expect("write");

        let sink = DirectorySink::new(out.path());
        let (tx, mut rx) = mpsc::channel(8);
        let progress = ProgressReporter::new("t:up:1", "part 1/1", ProgressKind::Uploading, tx);
        let part = PartUpload {
            path: src,
            index: 1,
            total: 1,
            size_bytes: (COPY_CHUNK_BYTES + 10) as u64,
            caption: "Part: clip.part01.mp4".to_string(),
        };

        sink.deliver(RequesterId(1), &part, progress)
            .await
            .expect("deliver");

        let copied = std::fs::read(out.path().join("clip.part01.mp4")).expect("read");
        assert_eq!(copied.len(), COPY_CHUNK_BYTES + 10);

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        let last = last.expect("progress events");
        assert_eq!(last.bytes_done, last.bytes_total);
        assert_eq!(last.percent, 100.0);
    }

    #[tokio::test]
    async fn missing_part_is_an_error() {
        let out = tempfile::tempdir().expect("tempdir");
        let sink = DirectorySink::new(out.path());
        let (tx, _rx) = mpsc::channel(1);
        let progress = ProgressReporter::new("k", "l", ProgressKind::Uploading, tx);
        let part = PartUpload {
            path: out.path().join("nope.mp4"),
            index: 1,
            total: 1,
            size_bytes: 0,
            caption: String::new(),
        };

        let result = sink.deliver(RequesterId(1), &part, progress).await;

        assert!(matches!(result, Err(DeliveryError::Io(_))));
    }
}
