// Failure diagnostics - turns yt-dlp stderr into a user-facing reason
//
// yt-dlp reports everything as free text on stderr. The patterns below are
// checked from most to least specific.

use serde::{Deserialize, Serialize};

use super::utils::error_summary;

/// Why yt-dlp refused or failed a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// DRM-protected or paid content, cannot be downloaded at all
    DrmProtected,
    MembersOnly,
    AgeRestricted,
    PrivateVideo,
    /// Deleted, removed for copyright, or otherwise gone
    VideoUnavailable,
    GeoBlocked,
    /// HTTP 429
    RateLimited,
    BotDetection,
    /// HTTP 403 without a more specific cause
    Forbidden,
    NetworkTimeout,
    UnsupportedUrl,
    /// Requested quality does not exist for this video
    FormatUnavailable,
    Unknown,
}

impl FailureReason {
    /// Nothing the user can change will make this download work.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::DrmProtected | Self::VideoUnavailable | Self::UnsupportedUrl
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::DrmProtected => "DRM-protected content",
            Self::MembersOnly => "Members-only content",
            Self::AgeRestricted => "Age-restricted content",
            Self::PrivateVideo => "Private video",
            Self::VideoUnavailable => "Video unavailable",
            Self::GeoBlocked => "Not available in your country",
            Self::RateLimited => "Rate limited by YouTube",
            Self::BotDetection => "Bot detection triggered",
            Self::Forbidden => "Access denied (HTTP 403)",
            Self::NetworkTimeout => "Network timeout",
            Self::UnsupportedUrl => "Unsupported URL",
            Self::FormatUnavailable => "Requested quality is not available",
            Self::Unknown => "yt-dlp reported an error",
        }
    }

    /// Short advice appended to the error message, if there is any.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::AgeRestricted | Self::MembersOnly | Self::PrivateVideo => {
                Some("the video needs a logged-in account")
            }
            Self::GeoBlocked => Some("try a proxy in an allowed region"),
            Self::RateLimited | Self::BotDetection | Self::Forbidden => {
                Some("wait a while or use a proxy, and keep yt-dlp up to date")
            }
            Self::NetworkTimeout => Some("check your connection and try again"),
            Self::FormatUnavailable => Some("pick a lower quality or 'best'"),
            Self::UnsupportedUrl => Some("check the URL"),
            Self::DrmProtected | Self::VideoUnavailable | Self::Unknown => None,
        }
    }
}

/// Analyze error output and return the most specific reason, `None` if empty.
pub fn diagnose_error(error: &str) -> Option<FailureReason> {
    if error.trim().is_empty() {
        return None;
    }
    let lower = error.to_lowercase();
    let any = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    let reason = if any(&[
        "drm",
        "widevine",
        "playready",
        "fairplay",
        "requires purchase",
        "this video requires payment",
    ]) {
        FailureReason::DrmProtected
    } else if any(&["members only", "members-only", "join this channel", "available to members"]) {
        FailureReason::MembersOnly
    } else if any(&["age-restricted", "sign in to confirm your age", "age_verification"]) {
        FailureReason::AgeRestricted
    } else if any(&["private video", "video is private"]) {
        FailureReason::PrivateVideo
    } else if any(&[
        "video unavailable",
        "video has been removed",
        "no longer available",
        "video is unavailable",
    ]) {
        FailureReason::VideoUnavailable
    } else if any(&["not available in your country", "blocked in your country", "geo restrict"]) {
        FailureReason::GeoBlocked
    } else if any(&["unsupported url", "is not a valid url"]) {
        FailureReason::UnsupportedUrl
    } else if any(&["requested format is not available"]) {
        FailureReason::FormatUnavailable
    } else if any(&["429", "too many requests", "rate limit"]) {
        FailureReason::RateLimited
    } else if any(&["confirm you're not a bot", "captcha", "unusual traffic"]) {
        FailureReason::BotDetection
    } else if any(&["403", "forbidden"]) {
        FailureReason::Forbidden
    } else if any(&["timed out", "timeout", "connection refused", "network is unreachable"]) {
        FailureReason::NetworkTimeout
    } else {
        FailureReason::Unknown
    };

    Some(reason)
}

/// One-paragraph message for an Error event.
pub fn describe_failure(stderr: &str) -> String {
    let summary = error_summary(stderr, 2);
    match diagnose_error(stderr) {
        Some(reason) => match reason.hint() {
            Some(hint) => format!("{}: {} ({})", reason.description(), summary, hint),
            None => format!("{}: {}", reason.description(), summary),
        },
        None => "yt-dlp exited without an error message".to_string(),
    }
}
