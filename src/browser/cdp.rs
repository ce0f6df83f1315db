//! DevTools-protocol implementations of the driver traits.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetUserAgentOverrideParams};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::Page;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, warn};

use crate::browser::{
    BrowserDriver, BrowserPool, HarvestPage, USER_AGENTS, VIEWPORT_BASE, VIEWPORT_JITTER,
};
use crate::error::ScrapeError;
use crate::models::{CookieEntry, CredentialBundle};

/// Resolves once the document is interactive, without relying on a fixed
/// sleep.
const READY_STATE_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

fn driver_err(e: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::Driver(e.to_string())
}

/// One live CDP page with user agent, viewport, and cookies applied.
pub struct CdpPage {
    page: Page,
}

impl CdpPage {
    pub(crate) async fn prepare(
        page: Page,
        bundle: Option<&CredentialBundle>,
    ) -> Result<Self, ScrapeError> {
        let (ua_idx, dw, dh) = {
            let mut rng = rand::rng();
            (
                rng.random_range(0..USER_AGENTS.len()),
                rng.random_range(0..=VIEWPORT_JITTER),
                rng.random_range(0..=VIEWPORT_JITTER),
            )
        };

        page.execute(SetUserAgentOverrideParams::new(USER_AGENTS[ua_idx].to_string()))
            .await
            .map_err(driver_err)?;

        let metrics = SetDeviceMetricsOverrideParams::new(
            (VIEWPORT_BASE.0 + dw) as i64,
            (VIEWPORT_BASE.1 + dh) as i64,
            1.0,
            false,
        );
        page.execute(metrics).await.map_err(driver_err)?;

        let prepared = Self { page };
        if let Some(bundle) = bundle {
            prepared.set_cookies(&bundle.cookies).await?;
        }
        Ok(prepared)
    }
}

#[async_trait]
impl HarvestPage for CdpPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), ScrapeError> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| ScrapeError::Navigation(format!("invalid URL {url}: {e}")))?;

        tokio::time::timeout(timeout, self.page.execute(params))
            .await
            .map_err(|_| {
                ScrapeError::Navigation(format!(
                    "page load timeout after {}s for {url}",
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| ScrapeError::Navigation(e.to_string()))?;

        // Best-effort wait for DOM content; non-HTML responses make the
        // script fail, which is fine.
        match tokio::time::timeout(timeout, self.page.evaluate(READY_STATE_SCRIPT.to_string()))
            .await
        {
            Ok(Ok(result)) => {
                let state: String = result.into_value().unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state for {}: {}", url, state);
            }
            Ok(Err(e)) => debug!("Could not check ready state for {}: {}", url, e),
            Err(_) => warn!("Timeout waiting for ready state on {}", url),
        }

        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, ScrapeError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn set_cookies(&self, cookies: &[CookieEntry]) -> Result<(), ScrapeError> {
        for cookie in cookies {
            let param = CookieParam::builder()
                .name(&cookie.name)
                .value(&cookie.value)
                .domain(cookie.domain())
                .path(cookie.path())
                .build();
            match param {
                Ok(param) => {
                    if let Err(e) = self.page.set_cookie(param).await {
                        warn!("Failed to set cookie {}: {}", cookie.name, e);
                    }
                }
                Err(e) => warn!("Failed to build cookie {}: {}", cookie.name, e),
            }
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, ScrapeError> {
        let result = self.page.evaluate(script.to_string()).await.map_err(driver_err)?;
        Ok(result.into_value().unwrap_or(Value::Null))
    }

    async fn click(&self, selector: &str) -> Result<bool, ScrapeError> {
        match self.page.find_element(selector).await {
            Ok(element) => {
                element.click().await.map_err(driver_err)?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn body_text(&self) -> Result<String, ScrapeError> {
        let value = self
            .evaluate("document.body ? document.body.innerText : ''")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn close(&self) {
        let _ = self.page.clone().close().await;
    }
}

/// Driver over the process-wide [`BrowserPool`].
pub struct CdpDriver;

impl CdpDriver {
    pub fn shared() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserDriver for CdpDriver {
    async fn open_page(
        &self,
        bundle: Option<&CredentialBundle>,
        proxy: Option<&str>,
    ) -> Result<Box<dyn HarvestPage>, ScrapeError> {
        BrowserPool::global().acquire_context(bundle, proxy).await
    }

    async fn shutdown(&self) {
        BrowserPool::global().shutdown().await;
    }
}
