// Blocking diagnostics - classifies extractor stderr
//
// Turns a raw yt-dlp failure into a short cause for the requester.

use serde::{Deserialize, Serialize};

/// Reasons a content host may refuse a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockingReason {
    /// HTTP 403 Forbidden - general access denied
    Http403Forbidden,

    /// Rate limiting (429 or similar)
    RateLimited,

    /// Bot or automation detection triggered
    BotDetection,

    /// Content requires a signed-in account
    LoginRequired,

    GeoBlocked,

    PrivateVideo,

    /// Removed, deleted or never existed
    VideoUnavailable,

    /// DRM-protected content. Permanent restriction, not an error.
    DrmProtected,

    /// The extractor has no support for this site
    UnsupportedUrl,

    /// Network timeout (soft IP block)
    NetworkTimeout,

    Unknown,
}

impl BlockingReason {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Http403Forbidden => "Access denied (HTTP 403)",
            Self::RateLimited => "Rate limited by the host",
            Self::BotDetection => "Bot detection triggered",
            Self::LoginRequired => "Sign-in required",
            Self::GeoBlocked => "Geographic restriction",
            Self::PrivateVideo => "Private video",
            Self::VideoUnavailable => "Video unavailable",
            Self::DrmProtected => "DRM-protected content",
            Self::UnsupportedUrl => "Unsupported URL",
            Self::NetworkTimeout => "Network timeout (possible IP throttling)",
            Self::Unknown => "Unknown error",
        }
    }
}

/// Classify an error message; `None` for empty input
pub fn diagnose_error(error: &str) -> Option<BlockingReason> {
    let lower = error.to_lowercase();

    // Order matters: most specific first

    if lower.contains("drm")
        || lower.contains("widevine")
        || lower.contains("playready")
        || lower.contains("fairplay")
        || lower.contains("encrypted media")
    {
        return Some(BlockingReason::DrmProtected);
    }

    if lower.contains("unsupported url") {
        return Some(BlockingReason::UnsupportedUrl);
    }

    if lower.contains("private video") || lower.contains("video is private") {
        return Some(BlockingReason::PrivateVideo);
    }

    if lower.contains("video unavailable")
        || lower.contains("video has been removed")
        || lower.contains("no longer available")
        || lower.contains("video is unavailable")
        || lower.contains("http error 404")
    {
        return Some(BlockingReason::VideoUnavailable);
    }

    if lower.contains("not available in your country")
        || lower.contains("blocked in your country")
        || lower.contains("geo restricted")
        || lower.contains("geo-restricted")
    {
        return Some(BlockingReason::GeoBlocked);
    }

    if lower.contains("login required")
        || lower.contains("sign in to confirm your age")
        || lower.contains("requires authentication")
        || lower.contains("use --cookies")
    {
        return Some(BlockingReason::LoginRequired);
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return Some(BlockingReason::RateLimited);
    }

    if lower.contains("not a bot")
        || lower.contains("captcha")
        || lower.contains("unusual traffic")
        || lower.contains("cloudflare")
        || lower.contains("impersonat")
    {
        return Some(BlockingReason::BotDetection);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(BlockingReason::Http403Forbidden);
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("network unreachable")
    {
        return Some(BlockingReason::NetworkTimeout);
    }

    if !error.trim().is_empty() {
        return Some(BlockingReason::Unknown);
    }

    None
}
