// TimeSplitter - cut an oversized file into independently playable parts
//
// Parts are fixed-length time windows sized from the average bitrate, each
// produced by a stream-copy transcode. Variable-bitrate sources can overshoot
// the estimate, so every part is checked against max + tolerance afterwards.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::errors::{LeechError, LeechResult};
use super::transcoder::{TranscodeJob, Transcoder};
use super::utils::file_size;

pub const MIN_SEGMENT_SECS: u64 = 5;
pub const FALLBACK_SEGMENT_SECS: u64 = 10;
pub const DEFAULT_TOLERANCE_BYTES: u64 = 1024 * 1024;

/// One time window of the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// 1-based part number
    pub index: usize,
    pub start_secs: u64,
    pub duration_secs: u64,
}

/// Segment length for a file of `size` bytes lasting `duration` seconds
pub fn segment_secs(size: u64, duration: f64, max_bytes: u64) -> u64 {
    let bytes_per_sec = size as f64 / duration;
    let seg = (max_bytes as f64 / bytes_per_sec).floor();
    if !seg.is_finite() || seg <= 0.0 {
        return FALLBACK_SEGMENT_SECS;
    }
    (seg as u64).max(MIN_SEGMENT_SECS)
}

/// Windows covering `0..ceil(duration)` in `seg` strides; the last is clamped
pub fn plan_windows(duration: f64, seg: u64) -> Vec<Window> {
    let total = duration.ceil() as u64;
    (0..total)
        .step_by(seg.max(1) as usize)
        .enumerate()
        .map(|(i, start)| Window {
            index: i + 1,
            start_secs: start,
            duration_secs: seg.min(total - start),
        })
        .collect()
}

pub struct TimeSplitter {
    transcoder: Arc<dyn Transcoder>,
    max_part_bytes: u64,
    tolerance_bytes: u64,
}

impl TimeSplitter {
    pub fn new(transcoder: Arc<dyn Transcoder>, max_part_bytes: u64, tolerance_bytes: u64) -> Self {
        Self {
            transcoder,
            max_part_bytes,
            tolerance_bytes,
        }
    }

    pub fn max_part_bytes(&self) -> u64 {
        self.max_part_bytes
    }

    pub fn part_path(src: &Path, out_dir: &Path, index: usize) -> PathBuf {
        let stem = src
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());
        out_dir.join(format!("{}.part{:02}.mp4", stem, index))
    }

    /// Split `src` into parts written to `out_dir`.
    ///
    /// A file already within the limit is returned unchanged as the sole part.
    pub async fn split(&self, src: &Path, out_dir: &Path) -> LeechResult<Vec<PathBuf>> {
        let size = file_size(src).await?;
        if size <= self.max_part_bytes {
            debug!(size, "no split needed");
            return Ok(vec![src.to_path_buf()]);
        }

        let duration = self.transcoder.probe_duration(src).await;
        if !(duration > 0.0) || !duration.is_finite() {
            return Err(LeechError::SplitFailed(
                "cannot determine duration; refusing size-based split".to_string(),
            ));
        }

        let seg = segment_secs(size, duration, self.max_part_bytes);
        let windows = plan_windows(duration, seg);
        info!(
            size,
            duration,
            segment_secs = seg,
            parts = windows.len(),
            "splitting by time"
        );

        let mut parts = Vec::with_capacity(windows.len());
        for window in &windows {
            let dst = Self::part_path(src, out_dir, window.index);
            let job = TranscodeJob::Window {
                src: src.to_path_buf(),
                dst: dst.clone(),
                start_secs: window.start_secs,
                duration_secs: window.duration_secs,
            };
            self.transcoder.transcode(&job).await.map_err(|e| {
                LeechError::SplitFailed(format!(
                    "ffmpeg split failed at start {}: {}",
                    window.start_secs, e
                ))
            })?;
            parts.push(dst);
        }

        let limit = self.max_part_bytes + self.tolerance_bytes;
        for part in &parts {
            let part_size = file_size(part).await?;
            if part_size > limit {
                return Err(LeechError::SplitFailed(format!(
                    "part too large after split: {} ({} bytes, limit {})",
                    part.display(),
                    part_size,
                    limit
                )));
            }
        }

        Ok(parts)
    }
}
