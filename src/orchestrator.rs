//! Entry points: method selection, wall-clock capping, error normalisation.
//!
//! `browser` and `auto` try the headless browser first under a hard
//! wall-clock cap. A launch-shaped failure (or, in `auto`, any terminal
//! browser error) with an `APIFY_TOKEN` configured transparently switches
//! to the API client. Fatal conditions never cross the public surface as
//! panics or raw errors; every run ends in a [`ScrapeOutcome`] and a
//! terminal progress record.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::apify::{ApifyClient, DEFAULT_MAX_REPLIES};
use crate::browser::BrowserDriver;
use crate::config::{self, keys, ConfigStore};
use crate::error::{is_browser_launch_failure, ScrapeError};
use crate::models::{CredentialBundle, ReplyScrapeOptions, ScrapeProgress, ScrapeStage};
use crate::pacing::{PacingPolicy, PacingPreset};
use crate::progress::{self, ProgressChannel};
use crate::rotation::CredentialRotator;
use crate::scrape::{
    harvest_account, harvest_single_post, EnumeratorBudgets, HarvestCallbacks, HarvestEmitter,
};
use crate::storage::HarvestStore;

/// Hard cap on one entry-point run.
pub const DEFAULT_WALL_CLOCK: Duration = Duration::from_secs(600);
/// Secondary race cap around browser-context creation.
const CONTEXT_RACE_CAP: Duration = Duration::from_secs(15);

/// How a harvest should be performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeMethod {
    Browser,
    Api,
    #[default]
    Auto,
}

impl FromStr for ScrapeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            // `playwright` is the legacy name for the browser path.
            "browser" | "playwright" => Ok(Self::Browser),
            "api" | "apify" => Ok(Self::Api),
            "auto" => Ok(Self::Auto),
            other => Err(format!(
                "unknown scrape method '{other}'; expected browser, api, or auto"
            )),
        }
    }
}

/// Normalised result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeOutcome {
    pub success: bool,
    /// Which path actually produced the data: `"browser"` or `"api"`.
    pub method: String,
    pub posts_found: u64,
    pub replies_found: u64,
    pub error: Option<String>,
}

enum Target {
    Account { handle: String, max_posts: usize },
    Tweet { root_id: String },
}

impl Target {
    fn progress_key(&self) -> String {
        match self {
            Target::Account { handle, .. } => progress::account_key(handle),
            Target::Tweet { root_id } => progress::tweet_key(root_id),
        }
    }

    fn describe(&self) -> String {
        match self {
            Target::Account { handle, max_posts } => format!("@{handle} ({max_posts} posts)"),
            Target::Tweet { root_id } => format!("post {root_id}"),
        }
    }
}

pub struct Orchestrator {
    store: Arc<dyn HarvestStore>,
    config: Arc<dyn ConfigStore>,
    driver: Arc<dyn BrowserDriver>,
    callbacks: Arc<HarvestCallbacks>,
    wall_clock: Duration,
    apify_base_url: Option<String>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn HarvestStore>, config: Arc<dyn ConfigStore>) -> Self {
        #[cfg(feature = "browser")]
        let driver: Arc<dyn BrowserDriver> = Arc::new(crate::browser::CdpDriver::shared());
        #[cfg(not(feature = "browser"))]
        let driver: Arc<dyn BrowserDriver> = Arc::new(crate::browser::UnavailableDriver);

        Self {
            store,
            config,
            driver,
            callbacks: Arc::new(HarvestCallbacks::default()),
            wall_clock: DEFAULT_WALL_CLOCK,
            apify_base_url: None,
        }
    }

    pub fn with_driver(mut self, driver: Arc<dyn BrowserDriver>) -> Self {
        self.driver = driver;
        self
    }

    pub fn with_callbacks(mut self, callbacks: HarvestCallbacks) -> Self {
        self.callbacks = Arc::new(callbacks);
        self
    }

    pub fn with_wall_clock(mut self, cap: Duration) -> Self {
        self.wall_clock = cap;
        self
    }

    /// Point the API client at another origin (tests).
    pub fn with_apify_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.apify_base_url = Some(base_url.into());
        self
    }

    /// Harvest a profile's recent posts and their replies.
    pub async fn scrape_account(
        &self,
        handle: &str,
        max_posts: usize,
        options: ReplyScrapeOptions,
        method: ScrapeMethod,
    ) -> ScrapeOutcome {
        self.run(
            Target::Account {
                handle: handle.to_string(),
                max_posts,
            },
            options,
            method,
        )
        .await
    }

    /// Harvest one root post and its replies.
    pub async fn scrape_root_post(
        &self,
        root_id: &str,
        options: ReplyScrapeOptions,
        method: ScrapeMethod,
    ) -> ScrapeOutcome {
        self.run(
            Target::Tweet {
                root_id: root_id.to_string(),
            },
            options,
            method,
        )
        .await
    }

    async fn run(
        &self,
        target: Target,
        options: ReplyScrapeOptions,
        method: ScrapeMethod,
    ) -> ScrapeOutcome {
        let key = target.progress_key();
        let channel = ProgressChannel::global();
        channel.clear(&key);
        channel.set(
            &key,
            ScrapeProgress::new(ScrapeStage::Init, format!("Preparing {}", target.describe())),
        );

        let mut emitter = HarvestEmitter::new(self.store.clone(), key, self.callbacks.clone());

        match self.prepare_and_dispatch(&mut emitter, &target, options, method).await {
            Ok(method_used) => {
                let message = format!(
                    "Harvested {} replies across {} posts",
                    emitter.replies_found(),
                    emitter.posts_found()
                );
                info!("{} via {}: {}", target.describe(), method_used, message);
                emitter.publish(ScrapeStage::Complete, message);
                ScrapeOutcome {
                    success: true,
                    method: method_used.to_string(),
                    posts_found: emitter.posts_found(),
                    replies_found: emitter.replies_found(),
                    error: None,
                }
            }
            Err((method_used, error)) => {
                let message = error.to_string();
                warn!("{} failed via {}: {}", target.describe(), method_used, message);
                emitter.publish(ScrapeStage::Error, message.clone());
                ScrapeOutcome {
                    success: false,
                    method: method_used.to_string(),
                    posts_found: emitter.posts_found(),
                    replies_found: emitter.replies_found(),
                    error: Some(message),
                }
            }
        }
    }

    /// Snapshot config, pick a credential, race the dispatch against the
    /// wall clock. Returns the method that produced the data.
    async fn prepare_and_dispatch(
        &self,
        emitter: &mut HarvestEmitter,
        target: &Target,
        options: ReplyScrapeOptions,
        method: ScrapeMethod,
    ) -> Result<&'static str, (&'static str, ScrapeError)> {
        let default_label = match method {
            ScrapeMethod::Api => "api",
            _ => "browser",
        };

        let setup = self.snapshot_config(emitter).await;
        let (bundle, proxy, token) = match setup {
            Ok(v) => v,
            Err(e) => return Err((default_label, e)),
        };

        match tokio::time::timeout(
            self.wall_clock,
            self.dispatch(emitter, target, options, method, bundle, proxy, token),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                // The cancelled harvest cannot close its page; drop the
                // whole browser so nothing leaks.
                self.driver.shutdown().await;
                Err((
                    default_label,
                    ScrapeError::WallClock(self.wall_clock.as_millis() as u64),
                ))
            }
        }
    }

    async fn snapshot_config(
        &self,
        emitter: &mut HarvestEmitter,
    ) -> Result<(Option<CredentialBundle>, Option<String>, Option<String>), ScrapeError> {
        if let Some(preset_name) = self.config.get(keys::SCRAPE_PACING_PRESET).await? {
            match PacingPreset::parse(&preset_name) {
                Some(preset) => PacingPolicy::global().apply_preset(preset),
                None => warn!("Ignoring unknown pacing preset {:?}", preset_name),
            }
        }

        let proxy = config::resolve_proxy(self.config.get(keys::PROXY_URL).await?.as_deref());
        let token = self
            .config
            .get(keys::APIFY_TOKEN)
            .await?
            .filter(|t| !t.trim().is_empty());

        let rotator = CredentialRotator::global();
        rotator.sync(config::load_credentials(self.config.as_ref()).await?);
        let index = rotator.current_index();
        let bundle = rotator.next();
        emitter.set_credentials(
            if bundle.is_some() { index as u64 + 1 } else { 0 },
            rotator.count() as u64,
        );

        Ok((bundle, proxy, token))
    }

    async fn dispatch(
        &self,
        emitter: &mut HarvestEmitter,
        target: &Target,
        options: ReplyScrapeOptions,
        method: ScrapeMethod,
        bundle: Option<CredentialBundle>,
        proxy: Option<String>,
        token: Option<String>,
    ) -> Result<&'static str, (&'static str, ScrapeError)> {
        match method {
            ScrapeMethod::Api => {
                let token = token.ok_or((
                    "api",
                    ScrapeError::Config("APIFY_TOKEN is not configured".to_string()),
                ))?;
                self.api_branch(emitter, target, options, proxy.as_deref(), &token)
                    .await
                    .map(|_| "api")
                    .map_err(|e| ("api", e))
            }
            ScrapeMethod::Browser | ScrapeMethod::Auto => {
                match self
                    .browser_branch(emitter, target, options, bundle, proxy.as_deref())
                    .await
                {
                    Ok(()) => Ok("browser"),
                    Err(error) => {
                        let launch_shaped = is_browser_launch_failure(&error.to_string());
                        let fallback = token.is_some()
                            && (method == ScrapeMethod::Auto || launch_shaped);
                        if !fallback {
                            return Err(("browser", error));
                        }
                        warn!("Browser harvest failed ({}); switching to API client", error);
                        let token = token.unwrap_or_default();
                        self.api_branch(emitter, target, options, proxy.as_deref(), &token)
                            .await
                            .map(|_| "api")
                            .map_err(|e| ("api", e))
                    }
                }
            }
        }
    }

    async fn browser_branch(
        &self,
        emitter: &mut HarvestEmitter,
        target: &Target,
        options: ReplyScrapeOptions,
        bundle: Option<CredentialBundle>,
        proxy: Option<&str>,
    ) -> Result<(), ScrapeError> {
        let page = tokio::time::timeout(
            CONTEXT_RACE_CAP,
            self.driver.open_page(bundle.as_ref(), proxy),
        )
        .await
        .map_err(|_| {
            ScrapeError::Driver(format!(
                "timed out creating a browser context after {}s",
                CONTEXT_RACE_CAP.as_secs()
            ))
        })??;

        let budgets = EnumeratorBudgets::from_env();
        let pacing = PacingPolicy::global();

        let result = match target {
            Target::Account { handle, max_posts } => {
                harvest_account(
                    page.as_ref(),
                    emitter,
                    handle,
                    *max_posts,
                    options,
                    budgets,
                    pacing,
                )
                .await
            }
            Target::Tweet { root_id } => {
                harvest_single_post(page.as_ref(), emitter, root_id, options, budgets, pacing)
                    .await
            }
        };

        page.close().await;
        result.map(|_| ())
    }

    async fn api_branch(
        &self,
        emitter: &mut HarvestEmitter,
        target: &Target,
        options: ReplyScrapeOptions,
        proxy: Option<&str>,
        token: &str,
    ) -> Result<(), ScrapeError> {
        let mut client = ApifyClient::new(token, proxy)?;
        if let Some(base_url) = &self.apify_base_url {
            client = client.with_base_url(base_url.clone());
        }

        match target {
            Target::Account { handle, max_posts } => {
                client
                    .scrape_timeline(emitter, handle, *max_posts, options.sort_mode)
                    .await?;
            }
            Target::Tweet { root_id } => {
                client
                    .scrape_replies(emitter, root_id, DEFAULT_MAX_REPLIES, options.sort_mode)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parsing_accepts_the_legacy_alias() {
        assert_eq!(ScrapeMethod::from_str("browser"), Ok(ScrapeMethod::Browser));
        assert_eq!(ScrapeMethod::from_str("playwright"), Ok(ScrapeMethod::Browser));
        assert_eq!(ScrapeMethod::from_str("API"), Ok(ScrapeMethod::Api));
        assert_eq!(ScrapeMethod::from_str("auto"), Ok(ScrapeMethod::Auto));
        assert!(ScrapeMethod::from_str("carrier-pigeon").is_err());
    }
}
