// Progress events and the worker-side reporter
//
// Extractor and sink callbacks never touch notifier or session state. They
// push a ProgressEvent into a bounded channel drained by the run controller;
// when the channel is full the event is dropped, not queued. Milestones go
// through a separate unbounded channel when one is attached.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// What a progress stream is reporting on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressKind {
    Downloading,
    /// Extractor finished writing; post-processing may follow
    Finished,
    Uploading,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Throttle key of the stream (one per download, one per uploaded part)
    pub key: String,
    pub kind: ProgressKind,
    /// File name or part caption shown to the requester
    pub label: String,
    pub percent: f64,
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub rate_bytes_per_sec: f64,
    pub eta_secs: Option<u64>,
}

/// Worker-side handle for one progress stream
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    key: String,
    label: String,
    kind: ProgressKind,
    tx: mpsc::Sender<ProgressEvent>,
    milestones: Option<mpsc::UnboundedSender<ProgressEvent>>,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        kind: ProgressKind,
        tx: mpsc::Sender<ProgressEvent>,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind,
            tx,
            milestones: None,
            started: Instant::now(),
        }
    }

    /// Route `finished` through a channel that never drops
    pub fn with_milestones(mut self, milestones: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.milestones = Some(milestones);
        self
    }

    /// Report bytes moved so far; the rate is the average since creation.
    /// Shape matches the `(bytesSent, totalBytes)` upload callback.
    pub fn report(&self, done: u64, total: u64) {
        let elapsed = self.started.elapsed().as_secs_f64().max(0.0001);
        let rate = done as f64 / elapsed;
        let eta = if rate > 0.0 && total > done {
            Some(((total - done) as f64 / rate) as u64)
        } else {
            None
        };
        self.send(self.kind, done, total, rate, eta);
    }

    /// Report with rate and ETA supplied by the producer
    pub fn report_with_rate(&self, done: u64, total: u64, rate: f64, eta: Option<u64>) {
        self.send(self.kind, done, total, rate, eta);
    }

    /// Producer finished writing the stream
    pub fn finished(&self, total: u64) {
        let event = self.event(ProgressKind::Finished, total, total, 0.0, None);
        match &self.milestones {
            Some(milestones) => {
                let _ = milestones.send(event);
            }
            None => {
                let _ = self.tx.try_send(event);
            }
        }
    }

    fn send(&self, kind: ProgressKind, done: u64, total: u64, rate: f64, eta: Option<u64>) {
        // Full or closed channel: the update is simply lost
        let _ = self.tx.try_send(self.event(kind, done, total, rate, eta));
    }

    fn event(
        &self,
        kind: ProgressKind,
        done: u64,
        total: u64,
        rate: f64,
        eta: Option<u64>,
    ) -> ProgressEvent {
        let percent = if total > 0 {
            (done as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
        ProgressEvent {
            key: self.key.clone(),
            kind,
            label: self.label.clone(),
            percent,
            bytes_done: done,
            bytes_total: total,
            rate_bytes_per_sec: rate,
            eta_secs: eta,
        }
    }
}

/// 10-cell style progress bar
pub fn progress_bar(percent: f64, length: usize) -> String {
    let filled = ((length as f64) * percent / 100.0).round();
    let filled = (filled.max(0.0) as usize).min(length);
    format!("{}{}", "▰".repeat(filled), "▱".repeat(length - filled))
}

/// Format a byte count for display
pub fn human_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < units.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, units[unit])
}

/// Status text for a progress event
pub fn render(event: &ProgressEvent) -> String {
    let mb = |bytes: f64| bytes / (1024.0 * 1024.0);
    match event.kind {
        ProgressKind::Finished => "⬇️ Download finished. Finalizing...".to_string(),
        ProgressKind::Downloading => format!(
            "⬇️ Downloading: {}\nProgress: {} {:.2}%\n{:.2} MB / {:.2} MB\nSpeed: {:.2} MB/s • ETA: {}s",
            event.label,
            progress_bar(event.percent, 10),
            event.percent,
            mb(event.bytes_done as f64),
            mb(event.bytes_total as f64),
            mb(event.rate_bytes_per_sec),
            event.eta_secs.unwrap_or(0),
        ),
        ProgressKind::Uploading => format!(
            "⬆️ Uploading {}\nProgress: {} {:.2}%\n{:.2} MB / {:.2} MB\nSpeed: {:.2} MB/s",
            event.label,
            progress_bar(event.percent, 10),
            event.percent,
            mb(event.bytes_done as f64),
            mb(event.bytes_total as f64),
            mb(event.rate_bytes_per_sec),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_is_clamped() {
        assert_eq!(progress_bar(0.0, 10), "▱▱▱▱▱▱▱▱▱▱");
        assert_eq!(progress_bar(50.0, 10), "▰▰▰▰▰▱▱▱▱▱");
        assert_eq!(progress_bar(250.0, 4), "▰▰▰▰");
        assert_eq!(progress_bar(-3.0, 4), "▱▱▱▱");
    }

    #[test]
    fn sizes_use_binary_units() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(512), "512.00 B");
        assert_eq!(human_size(1536), "1.50 KB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[tokio::test]
    async fn reporter_drops_events_when_channel_is_full() {
        let (tx, mut rx) = mpsc::channel(2);
        let reporter = ProgressReporter::new("dl:t", "video.mp4", ProgressKind::Downloading, tx);

        for done in 0..10 {
            reporter.report_with_rate(done, 10, 1.0, None);
        }
        drop(reporter);

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event.bytes_done);
        }
        assert_eq!(received, vec![0, 1]);
    }

    #[tokio::test]
    async fn milestone_survives_a_full_channel() {
        let (tx, mut rx) = mpsc::channel(2);
        let (milestone_tx, mut milestones) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new("dl:t", "video.mp4", ProgressKind::Downloading, tx)
            .with_milestones(milestone_tx);

        for done in 0..50 {
            reporter.report_with_rate(done, 100, 1.0, None);
        }
        reporter.finished(100);
        drop(reporter);

        let mut byte_events = 0;
        while rx.recv().await.is_some() {
            byte_events += 1;
        }
        assert_eq!(byte_events, 2);

        let milestone = milestones.recv().await.expect("milestone");
        assert_eq!(milestone.kind, ProgressKind::Finished);
        assert_eq!(milestone.percent, 100.0);
        assert!(milestones.recv().await.is_none());
    }

    #[tokio::test]
    async fn percent_is_derived_from_bytes() {
        let (tx, mut rx) = mpsc::channel(4);
        let reporter = ProgressReporter::new("up:t:1", "part 1/2", ProgressKind::Uploading, tx);

        reporter.report(25, 100);
        reporter.report(5, 0);

        let first = rx.recv().await.expect("event");
        assert_eq!(first.percent, 25.0);
        assert_eq!(first.key, "up:t:1");
        let second = rx.recv().await.expect("event");
        assert_eq!(second.percent, 0.0);
    }
}
