//! Config store seam and the keys the harvest core reads.

use async_trait::async_trait;

use crate::error::ScrapeError;
use crate::models::CredentialBundle;

/// Config keys used by the core.
pub mod keys {
    /// Primary credential bundle: JSON array of cookie objects.
    pub const X_COOKIES: &str = "X_COOKIES";
    /// JSON array of credential bundles for rotation.
    pub const X_COOKIES_LIST: &str = "X_COOKIES_LIST";
    /// Token for the fallback scraping API.
    pub const APIFY_TOKEN: &str = "APIFY_TOKEN";
    /// Proxy for all outbound traffic, e.g. `http://127.0.0.1:7897` or
    /// `socks5://host:port`. Changing it invalidates the cached browser.
    pub const PROXY_URL: &str = "PROXY_URL";
    /// Pacing preset name, see [`crate::pacing::PacingPreset`].
    pub const SCRAPE_PACING_PRESET: &str = "SCRAPE_PACING_PRESET";
}

/// Narrow read/write view over the KV config table.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ScrapeError>;
    async fn set(
        &self,
        key: &str,
        value: &str,
        description: Option<&str>,
    ) -> Result<(), ScrapeError>;
}

/// Resolve the effective proxy: the configured `PROXY_URL`, falling back to
/// the conventional environment variables.
pub fn resolve_proxy(configured: Option<&str>) -> Option<String> {
    if let Some(url) = configured {
        let trimmed = url.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    for var in ["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy", "HTTP_PROXY", "http_proxy"]
    {
        if let Ok(value) = std::env::var(var) {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
    }
    None
}

/// Load the rotation credentials: the `X_COOKIES_LIST` bundles when present,
/// otherwise the single `X_COOKIES` bundle. Malformed JSON is logged and
/// treated as absent so a bad config edit degrades to an anonymous harvest
/// instead of a hard failure.
pub async fn load_credentials(store: &dyn ConfigStore) -> Result<Vec<CredentialBundle>, ScrapeError> {
    if let Some(raw) = store.get(keys::X_COOKIES_LIST).await? {
        match CredentialBundle::list_from_json(&raw) {
            Ok(bundles) if !bundles.is_empty() => return Ok(bundles),
            Ok(_) => {}
            Err(e) => tracing::warn!("Ignoring malformed {}: {}", keys::X_COOKIES_LIST, e),
        }
    }
    if let Some(raw) = store.get(keys::X_COOKIES).await? {
        match CredentialBundle::from_json(&raw) {
            Ok(bundle) if !bundle.cookies.is_empty() => return Ok(vec![bundle]),
            Ok(_) => {}
            Err(e) => tracing::warn!("Ignoring malformed {}: {}", keys::X_COOKIES, e),
        }
    }
    Ok(Vec::new())
}
