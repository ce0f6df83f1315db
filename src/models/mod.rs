//! Data models for threadharvest.

mod credentials;
mod options;
mod post;
mod progress;

pub use credentials::{CookieEntry, CredentialBundle, PLATFORM_COOKIE_DOMAIN};
pub use options::{ReplyScrapeOptions, SortMode};
pub use post::{normalize_media_tags, Reply, RootPost, TAG_IMAGE, TAG_LINK, TAG_VIDEO};
pub use progress::{ScrapeProgress, ScrapeStage};

use chrono::{DateTime, Utc};

/// Parse an RFC3339 timestamp, defaulting to the Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse the timestamp formats the scraping API emits: RFC3339 or the
/// platform's legacy `Wed Oct 10 20:19:24 +0000 2018` form.
pub fn parse_api_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y")
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
