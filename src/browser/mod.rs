//! Browser driver seam.
//!
//! Harvesters and the enumerator only see [`BrowserDriver`] and
//! [`HarvestPage`]; the DevTools binding lives behind the `browser`
//! feature, and tests substitute the scripted [`fake`] driver.

pub mod fake;

#[cfg(feature = "browser")]
mod cdp;
#[cfg(feature = "browser")]
mod launch;
#[cfg(feature = "browser")]
mod pool;

#[cfg(feature = "browser")]
pub use cdp::CdpDriver;
#[cfg(feature = "browser")]
pub use pool::BrowserPool;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ScrapeError;
use crate::models::{CookieEntry, CredentialBundle};

/// Desktop user agents a context is randomly assigned from.
pub const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

/// Viewport base size; each context adds a small random offset.
pub const VIEWPORT_BASE: (u32, u32) = (1280, 800);
pub const VIEWPORT_JITTER: u32 = 160;

/// Hard cap on acquiring a ready page context.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// One live page. All methods suspend the caller; `close` must be called on
/// every exit path.
#[async_trait]
pub trait HarvestPage: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), ScrapeError>;

    /// Wait until the selector matches; `Ok(false)` on timeout.
    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, ScrapeError>;

    async fn set_cookies(&self, cookies: &[CookieEntry]) -> Result<(), ScrapeError>;

    /// Run an in-page script and return its JSON result.
    async fn evaluate(&self, script: &str) -> Result<Value, ScrapeError>;

    /// Click the first element matching the selector; `Ok(false)` when the
    /// element is absent.
    async fn click(&self, selector: &str) -> Result<bool, ScrapeError>;

    async fn body_text(&self) -> Result<String, ScrapeError>;

    async fn close(&self);
}

/// Produces disposable page contexts, pre-authenticated with a credential
/// bundle and routed through the effective proxy.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn open_page(
        &self,
        bundle: Option<&CredentialBundle>,
        proxy: Option<&str>,
    ) -> Result<Box<dyn HarvestPage>, ScrapeError>;

    /// Tear the browser down. The next `open_page` relaunches.
    async fn shutdown(&self);
}

/// Driver used when the crate is built without the `browser` feature. Its
/// error matches the launch-failure shape, so `auto` mode falls through to
/// the API client.
pub struct UnavailableDriver;

#[async_trait]
impl BrowserDriver for UnavailableDriver {
    async fn open_page(
        &self,
        _bundle: Option<&CredentialBundle>,
        _proxy: Option<&str>,
    ) -> Result<Box<dyn HarvestPage>, ScrapeError> {
        Err(ScrapeError::BrowserLaunch(
            "browser support not compiled; rebuild with --features browser".to_string(),
        ))
    }

    async fn shutdown(&self) {}
}
