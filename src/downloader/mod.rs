// Downloader module - the leech pipeline
//
// extract -> download -> normalize -> split -> upload, with external tools
// (yt-dlp, ffmpeg, ffprobe) behind traits so the orchestration can be driven
// by fakes in tests.

pub mod attempt;
pub mod delivery;
pub mod errors;
pub mod extractors;
pub mod format_selector;
pub mod models;
pub mod normalizer;
pub mod notifier;
pub mod orchestrator;
pub mod progress;
pub mod session;
pub mod splitter;
pub mod tools;
pub mod transcoder;
pub mod utils;

pub use delivery::{DeliveryError, DeliverySink, DirectorySink};
pub use errors::{LeechError, LeechResult, ToolError};
pub use extractors::{
    DownloadRequest, ExtractionRetrier, MediaExtractor, NegotiationProfile, YtDlpExtractor,
};
pub use format_selector::FormatSelector;
pub use models::{
    EncodingCandidate, FormatChoice, PartUpload, RequesterId, RunReport, Session, Stage,
    Submission, VideoMetadata,
};
pub use normalizer::{MediaNormalizer, NormalizedMedia};
pub use notifier::ThrottledNotifier;
pub use orchestrator::PipelineOrchestrator;
pub use progress::{ProgressEvent, ProgressKind, ProgressReporter};
pub use session::SessionStore;
pub use splitter::TimeSplitter;
pub use tools::{ToolInfo, ToolManager, ToolType};
pub use transcoder::{EncodeProfile, FfmpegTranscoder, TranscodeJob, Transcoder};
