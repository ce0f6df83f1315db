//! Lazy singleton browser shared by all harvests in the process.
//!
//! The browser launches on first acquire and stays warm between runs. A
//! change of the effective proxy closes it so the next acquire relaunches
//! with the new launch arguments.

use std::sync::OnceLock;

use chromiumoxide::Browser;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::browser::cdp::CdpPage;
use crate::browser::{launch, HarvestPage, ACQUIRE_TIMEOUT};
use crate::error::ScrapeError;
use crate::models::CredentialBundle;

struct SharedBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
    proxy: Option<String>,
}

pub struct BrowserPool {
    inner: Mutex<Option<SharedBrowser>>,
}

impl BrowserPool {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub fn global() -> &'static BrowserPool {
        static POOL: OnceLock<BrowserPool> = OnceLock::new();
        POOL.get_or_init(BrowserPool::new)
    }

    /// Open a disposable page context: randomised user agent and viewport,
    /// cookies from the bundle pre-installed. Launches the browser first if
    /// needed. The whole acquisition is capped at 30 s.
    pub async fn acquire_context(
        &self,
        bundle: Option<&CredentialBundle>,
        proxy: Option<&str>,
    ) -> Result<Box<dyn HarvestPage>, ScrapeError> {
        tokio::time::timeout(ACQUIRE_TIMEOUT, self.acquire_inner(bundle, proxy))
            .await
            .map_err(|_| {
                ScrapeError::Driver(format!(
                    "timed out acquiring a browser context after {}s",
                    ACQUIRE_TIMEOUT.as_secs()
                ))
            })?
    }

    async fn acquire_inner(
        &self,
        bundle: Option<&CredentialBundle>,
        proxy: Option<&str>,
    ) -> Result<Box<dyn HarvestPage>, ScrapeError> {
        let mut guard = self.inner.lock().await;

        let proxy_changed = guard
            .as_ref()
            .map(|shared| shared.proxy.as_deref() != proxy)
            .unwrap_or(false);
        if proxy_changed {
            info!("Proxy changed (now {:?}); relaunching browser", proxy);
            if let Some(mut shared) = guard.take() {
                let _ = shared.browser.close().await;
                shared.handler.abort();
            }
        }

        if guard.is_none() {
            let (browser, handler) = launch::launch(proxy).await?;
            *guard = Some(SharedBrowser {
                browser,
                handler,
                proxy: proxy.map(|s| s.to_string()),
            });
        }

        let shared = guard
            .as_ref()
            .ok_or_else(|| ScrapeError::Driver("browser vanished during acquire".to_string()))?;

        let page = shared
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::Driver(format!("failed to create page: {e}")))?;

        debug!("Created browser context (proxy: {})", proxy.unwrap_or("none"));
        let prepared = CdpPage::prepare(page, bundle).await?;
        Ok(Box::new(prepared))
    }

    /// Close the shared browser. The next acquire relaunches.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(mut shared) = guard.take() {
            info!("Closing shared browser");
            let _ = shared.browser.close().await;
            shared.handler.abort();
        }
    }
}

impl Default for BrowserPool {
    fn default() -> Self {
        Self::new()
    }
}
