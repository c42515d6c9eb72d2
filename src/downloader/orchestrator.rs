// PipelineOrchestrator - submit, then drive a run through its stages
//
// Extracting -> Downloading -> Normalizing -> Splitting -> Uploading -> Done,
// with Failed reachable from every stage. Each run owns a scratch directory
// that is removed on every exit path. Workers only push progress events into
// a bounded channel; this loop is the only place that gates them through the
// notifier and talks to the sink.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::delivery::DeliverySink;
use super::errors::{LeechError, LeechResult};
use super::extractors::{DownloadRequest, ExtractionRetrier, MediaExtractor};
use super::format_selector::FormatSelector;
use super::models::{
    EncodingCandidate, FormatChoice, PartUpload, RequesterId, RunReport, Session, Stage,
    Submission,
};
use super::normalizer::MediaNormalizer;
use super::notifier::ThrottledNotifier;
use super::progress::{human_size, render, ProgressEvent, ProgressKind, ProgressReporter};
use super::session::SessionStore;
use super::splitter::TimeSplitter;
use super::transcoder::Transcoder;
use super::utils::{file_size, largest_file};
use crate::config::LeechConfig;

const WORKDIR_PREFIX: &str = "leech_";

pub struct PipelineOrchestrator {
    retrier: ExtractionRetrier,
    selector: FormatSelector,
    normalizer: MediaNormalizer,
    splitter: TimeSplitter,
    sink: Arc<dyn DeliverySink>,
    sessions: Arc<SessionStore>,
    notifier: Arc<ThrottledNotifier>,
    work_root: PathBuf,
    channel_capacity: usize,
    session_ttl: std::time::Duration,
}

/// Per-run state threaded through the stages
struct RunContext<'a> {
    session: &'a Session,
    cancel: &'a CancellationToken,
    workdir: &'a Path,
    tx: mpsc::Sender<ProgressEvent>,
    rx: mpsc::Receiver<ProgressEvent>,
    /// Milestones bypass the bounded channel so they are never dropped
    milestone_tx: mpsc::UnboundedSender<ProgressEvent>,
    milestones: mpsc::UnboundedReceiver<ProgressEvent>,
    stage: Stage,
}

impl PipelineOrchestrator {
    pub fn new(
        config: &LeechConfig,
        extractor: Arc<dyn MediaExtractor>,
        transcoder: Arc<dyn Transcoder>,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        Self {
            retrier: ExtractionRetrier::new(extractor),
            selector: FormatSelector::new(config.max_height),
            normalizer: MediaNormalizer::new(transcoder.clone(), config.encode.clone()),
            splitter: TimeSplitter::new(
                transcoder,
                config.max_part_bytes,
                config.part_tolerance_bytes,
            ),
            sink,
            sessions: Arc::new(SessionStore::new()),
            notifier: Arc::new(ThrottledNotifier::new(config.progress_interval())),
            work_root: config.work_root.clone(),
            channel_capacity: config.progress_channel_capacity.max(1),
            session_ttl: config.session_ttl(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn notifier(&self) -> &Arc<ThrottledNotifier> {
        &self.notifier
    }

    /// Cancel a pending or running request; the run observes it at its next await
    pub fn cancel(&self, token: &str) -> bool {
        self.sessions.cancel(token)
    }

    /// Expire sessions older than the configured TTL
    pub fn sweep_expired(&self) -> usize {
        self.sessions.sweep_expired(self.session_ttl)
    }

    /// Resolve formats for `url` and open a session bound to the offered choices
    pub async fn submit(&self, url: &str, requester: RequesterId) -> LeechResult<Submission> {
        info!(url, requester = %requester, "submit");

        let result = self.resolve_formats(url).await;
        let (title, candidates) = match result {
            Ok(resolved) => resolved,
            Err(e) => {
                self.report_failure(requester, url, &e).await;
                return Err(e);
            }
        };

        let offered = candidates.iter().map(|c| c.format_id.clone()).collect();
        let token = self.sessions.create(url, requester, offered);
        let choices: Vec<FormatChoice> = candidates.iter().map(FormatChoice::from).collect();
        info!(token = %token, choices = choices.len(), "session opened");

        Ok(Submission {
            token,
            title,
            choices,
        })
    }

    async fn resolve_formats(
        &self,
        url: &str,
    ) -> LeechResult<(String, Vec<EncodingCandidate>)> {
        let metadata = self.retrier.fetch_metadata(url).await?;
        let candidates = self.selector.select(&metadata.formats);
        if candidates.is_empty() {
            return Err(LeechError::NoFormatsAvailable);
        }
        Ok((metadata.title, candidates))
    }

    /// Run the pipeline for a session with the chosen format
    pub async fn run(&self, token: &str, format_id: &str) -> LeechResult<RunReport> {
        let claimed = self.sessions.claim(token)?;
        let session = claimed.session;
        info!(token, format = format_id, url = %session.source_url, "run started");

        let outcome = self.run_in_workdir(&session, &claimed.cancel, format_id).await;

        self.sessions.finish(token);
        self.notifier.forget_prefix(token);

        match outcome {
            Ok(report) => {
                info!(
                    token,
                    parts = report.parts_delivered,
                    bytes = report.total_bytes,
                    "run finished"
                );
                Ok(report)
            }
            Err((failed_at, e)) => {
                error!(token, failed_at = %failed_at, error = %e, "run failed");
                self.announce_stage(&session, Stage::Failed).await;
                self.report_failure(session.requester, &session.source_url, &e)
                    .await;
                Err(e)
            }
        }
    }

    async fn run_in_workdir(
        &self,
        session: &Session,
        cancel: &CancellationToken,
        format_id: &str,
    ) -> Result<RunReport, (Stage, LeechError)> {
        tokio::fs::create_dir_all(&self.work_root)
            .await
            .map_err(|e| (Stage::Extracting, LeechError::io(&self.work_root, e)))?;
        let workdir = tempfile::Builder::new()
            .prefix(WORKDIR_PREFIX)
            .tempdir_in(&self.work_root)
            .map_err(|e| (Stage::Extracting, LeechError::io(&self.work_root, e)))?;

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let (milestone_tx, milestones) = mpsc::unbounded_channel();
        let mut ctx = RunContext {
            session,
            cancel,
            workdir: workdir.path(),
            tx,
            rx,
            milestone_tx,
            milestones,
            stage: Stage::Extracting,
        };

        let outcome = self.drive(&mut ctx, format_id).await;
        let failed_at = ctx.stage;
        drop(ctx);

        let path = workdir.path().to_path_buf();
        match tokio::task::spawn_blocking(move || workdir.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(dir = %path.display(), error = %e, "failed to remove run directory")
            }
            Err(e) => warn!(dir = %path.display(), error = %e, "cleanup task failed"),
        }

        outcome.map_err(|e| (failed_at, e))
    }

    async fn drive(&self, ctx: &mut RunContext<'_>, format_id: &str) -> LeechResult<RunReport> {
        let session = ctx.session;
        let workdir = ctx.workdir;
        let token = session.token.clone();
        let requester = session.requester;

        // Extracting: formats were resolved at submit; the choice must be one of them
        self.enter(ctx, Stage::Extracting, format!("🔎 Preparing format `{}`", format_id))
            .await?;
        if !session.offers(format_id) {
            return Err(LeechError::FormatNotOffered(format_id.to_string()));
        }

        // Downloading
        self.enter(
            ctx,
            Stage::Downloading,
            format!(
                "⏬ Starting download for selected format `{}`\nURL: {}",
                format_id, session.source_url
            ),
        )
        .await?;
        let request = DownloadRequest {
            url: session.source_url.clone(),
            format_id: format_id.to_string(),
            output_dir: workdir.to_path_buf(),
        };
        let reporter = ProgressReporter::new(
            format!("{}:dl", token),
            session.source_url.clone(),
            ProgressKind::Downloading,
            ctx.tx.clone(),
        )
        .with_milestones(ctx.milestone_tx.clone());
        let profile = self
            .pump(ctx, self.retrier.download(&request, &reporter))
            .await?;
        drop(reporter);
        let downloaded = largest_file(workdir)
            .await?
            .ok_or_else(|| LeechError::DownloadFailed("download produced no files".to_string()))?;
        info!(token = %token, profile = %profile, file = %downloaded.display(), "download complete");
        self.say(
            requester,
            format!("⬇️ Download complete: {}", display_name(&downloaded)),
        )
        .await;

        // Normalizing
        self.enter(ctx, Stage::Normalizing, "🔧 Remuxing to streamable MP4...".to_string())
            .await?;
        let normalized = self.pump(ctx, self.normalizer.normalize(&downloaded)).await?;
        if normalized.reencoded {
            self.say(requester, "⚠️ Remux failed, re-encoded instead.".to_string())
                .await;
        }
        // Raw download is not needed past this point
        if normalized.path != downloaded {
            let _ = tokio::fs::remove_file(&downloaded).await;
        }

        // Splitting
        let size = file_size(&normalized.path).await?;
        let split_note = if size > self.splitter.max_part_bytes() {
            format!(
                "✂️ File {} is {}; splitting into <= {} parts...",
                display_name(&normalized.path),
                human_size(size),
                human_size(self.splitter.max_part_bytes())
            )
        } else {
            format!("📦 File is {}; no split needed.", human_size(size))
        };
        self.enter(ctx, Stage::Splitting, split_note).await?;
        let parts = self
            .pump(ctx, self.splitter.split(&normalized.path, workdir))
            .await?;

        // Uploading: strictly sequential, stop at the first failure
        let total = parts.len();
        self.enter(
            ctx,
            Stage::Uploading,
            format!("📤 Uploading {} part(s)...", total),
        )
        .await?;
        let mut total_bytes = 0u64;
        for (i, part) in parts.iter().enumerate() {
            let index = i + 1;
            self.ensure_live(ctx)?;
            let name = display_name(part);
            self.say(
                requester,
                format!("📤 Uploading part {}/{}: {}", index, total, name),
            )
            .await;

            let size_bytes = file_size(part).await?;
            let upload = PartUpload {
                path: part.clone(),
                index,
                total,
                size_bytes,
                caption: format!("Part: {}", name),
            };
            let reporter = ProgressReporter::new(
                format!("{}:up:{}", token, index),
                name.clone(),
                ProgressKind::Uploading,
                ctx.tx.clone(),
            );
            let sink = &self.sink;
            let delivery = async move {
                sink.deliver(requester, &upload, reporter)
                    .await
                    .map_err(|e| LeechError::UploadFailed {
                        part: index,
                        total,
                        cause: e.to_string(),
                    })
            };
            self.pump(ctx, delivery).await?;

            total_bytes += size_bytes;
            info!(token = %token, part = index, total, bytes = size_bytes, "part uploaded");
            self.sink
                .log(&format!("✔️ Uploaded part {}/{}: {}", index, total, name))
                .await;
        }

        self.set_stage(ctx, Stage::Done).await;
        self.say(
            requester,
            format!("✅ All done. Uploaded {} file(s).", total),
        )
        .await;
        self.sink
            .log(&format!(
                "Completed leech for {}. Parts: {}",
                session.source_url, total
            ))
            .await;

        Ok(RunReport {
            token,
            stage: Stage::Done,
            parts_delivered: total,
            total_bytes,
        })
    }

    /// Stage entry: liveness check, then a forced status update
    async fn enter(&self, ctx: &mut RunContext<'_>, stage: Stage, text: String) -> LeechResult<()> {
        self.ensure_live(ctx)?;
        self.set_stage(ctx, stage).await;
        let key = format!("{}:stage", ctx.session.token);
        if self.notifier.gate(&key, true) {
            self.sink.notify(ctx.session.requester, &text).await;
        }
        Ok(())
    }

    async fn set_stage(&self, ctx: &mut RunContext<'_>, stage: Stage) {
        ctx.stage = stage;
        self.announce_stage(ctx.session, stage).await;
    }

    async fn announce_stage(&self, session: &Session, stage: Stage) {
        info!(token = %session.token, stage = %stage, "stage");
        self.sink
            .stage_changed(session.requester, &session.token, stage)
            .await;
    }

    fn ensure_live(&self, ctx: &RunContext<'_>) -> LeechResult<()> {
        if ctx.cancel.is_cancelled() || !self.sessions.contains(&ctx.session.token) {
            return Err(LeechError::Cancelled);
        }
        Ok(())
    }

    /// Await a stage future while relaying its progress events.
    ///
    /// Cancellation drops the future, which kills any child process it owns.
    async fn pump<T, F>(&self, ctx: &mut RunContext<'_>, fut: F) -> LeechResult<T>
    where
        F: Future<Output = LeechResult<T>>,
    {
        tokio::pin!(fut);
        let cancel = ctx.cancel;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LeechError::Cancelled),
                result = &mut fut => {
                    self.drain(ctx).await;
                    return result;
                }
                Some(event) = ctx.milestones.recv() => {
                    self.relay(ctx.session.requester, event).await;
                }
                Some(event) = ctx.rx.recv() => {
                    self.relay(ctx.session.requester, event).await;
                }
            }
        }
    }

    /// Discard stale byte progress, then relay every pending milestone
    async fn drain(&self, ctx: &mut RunContext<'_>) {
        while ctx.rx.try_recv().is_ok() {}
        while let Ok(event) = ctx.milestones.try_recv() {
            self.relay(ctx.session.requester, event).await;
        }
    }

    async fn relay(&self, requester: RequesterId, event: ProgressEvent) {
        let force = event.kind == ProgressKind::Finished;
        if self.notifier.gate(&event.key, force) {
            self.sink.notify(requester, &render(&event)).await;
        }
    }

    async fn say(&self, requester: RequesterId, text: String) {
        self.sink.notify(requester, &text).await;
    }

    /// One message to the requester, one to the operational log
    async fn report_failure(&self, requester: RequesterId, url: &str, e: &LeechError) {
        self.sink
            .notify(requester, &format!("❌ {}", e.user_message()))
            .await;
        self.sink
            .log(&format!("Error while leeching {}: {}", url, e))
            .await;
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
