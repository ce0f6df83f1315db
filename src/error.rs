//! Error types for the harvest core.
//!
//! The orchestrator classifies failures by message shape rather than by
//! variant alone, so the predicates at the bottom of this module are part of
//! the public contract: they decide retries and the browser → API fallback.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The platform served a login wall instead of the conversation.
    #[error("X cookies are missing or expired; update X_COOKIES / X_COOKIES_LIST and retry")]
    LoginWall,

    /// No usable browser could be launched.
    #[error("Browser launch failed: {0}")]
    BrowserLaunch(String),

    /// Navigation failed after retries across all candidate URLs.
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// The root post is deleted, restricted, or otherwise gone.
    #[error("Root post unavailable: {0}")]
    PostUnavailable(String),

    /// The hard wall-clock cap elapsed. Partial persisted state is kept.
    #[error("Harvest timed out after {0} ms; partial results were kept")]
    WallClock(u64),

    /// The scraping API's monthly quota is exhausted. Not retried.
    #[error("Scraping API quota exhausted: monthly usage hard limit exceeded")]
    ApiQuotaExhausted,

    /// Any other scraping-API failure (run failed, dataset missing, HTTP).
    #[error("Scraping API error: {0}")]
    Api(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Browser driver round-trip failure (evaluate, click, cookies).
    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        ScrapeError::Api(err.to_string())
    }
}

/// Message shapes produced by a browser that could not start at all, as
/// opposed to one that started and then misbehaved. The orchestrator swaps
/// to the API client when this matches.
pub fn is_browser_launch_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("browser launch failed")
        || lower.contains("failed to launch")
        || lower.contains("no usable browser")
        || lower.contains("chrome/chromium not found")
        || lower.contains("browser executable")
        || lower.contains("browser support not compiled")
}

/// Navigation failures worth retrying with backoff. Anything else is
/// surfaced immediately.
pub fn is_retryable_navigation(message: &str) -> bool {
    message.contains("ERR_CONNECTION_CLOSED")
        || message.contains("ERR_CONNECTION_RESET")
        || message.contains("ERR_NETWORK")
        || message.contains("NETWORK")
        || message.to_lowercase().contains("timeout")
        || message.to_lowercase().contains("timed out")
}
