// Media extraction - yt-dlp driven through ordered negotiation profiles
//
// `MediaExtractor` is the boundary to the external extractor; `YtDlpExtractor`
// implements it over the CLI binary. `ExtractionRetrier` walks the profile
// list and maps exhaustion into the pipeline error taxonomy.

mod cli;
mod diagnostics;
mod profiles;
mod retrier;
mod traits;

pub use cli::{parse_progress_line, ProgressLine, YtDlpExtractor};
pub use diagnostics::{diagnose_error, BlockingReason};
pub use profiles::NegotiationProfile;
pub use retrier::ExtractionRetrier;
pub use traits::{DownloadRequest, MediaExtractor, OUTPUT_TEMPLATE};
