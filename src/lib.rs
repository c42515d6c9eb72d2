pub mod config;
pub mod downloader;

pub use config::{ConfigError, LeechConfig};
pub use downloader::{
    DeliverySink, DirectorySink, FfmpegTranscoder, LeechError, LeechResult, MediaExtractor,
    PipelineOrchestrator, RequesterId, Submission, ToolManager, ToolType, Transcoder,
    YtDlpExtractor,
};
