//! Harvesters and the reply enumerator.

mod account;
mod emitter;
mod enumerate;
mod single;

pub use account::harvest_account;
pub use emitter::{HarvestCallbacks, HarvestEmitter};
pub use enumerate::{EnumeratorBudgets, ReplyEnumerator};
pub use single::harvest_single_post;

use std::time::Duration;

use tracing::warn;

use crate::browser::HarvestPage;
use crate::error::{is_retryable_navigation, ScrapeError};

/// Platform web origin and its legacy alias.
pub const PLATFORM_HOST: &str = "x.com";
pub const LEGACY_HOST: &str = "twitter.com";

/// The standard post-card element.
pub const POST_CARD_SELECTOR: &str = r#"article[data-testid="tweet"]"#;
pub const TAB_LIST_SELECTOR: &str = r#"[role="tablist"]"#;

pub(crate) const NAV_TIMEOUT: Duration = Duration::from_secs(30);
/// Backoff between navigation retries.
const NAV_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(3),
    Duration::from_secs(5),
    Duration::from_secs(7),
];

/// Navigate with retries. Only connection-shaped failures are retried;
/// anything else surfaces immediately.
pub(crate) async fn goto_with_retry(
    page: &dyn HarvestPage,
    url: &str,
    timeout: Duration,
) -> Result<(), ScrapeError> {
    let mut last_error = match page.goto(url, timeout).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    for delay in NAV_RETRY_DELAYS {
        if !is_retryable_navigation(&last_error.to_string()) {
            return Err(last_error);
        }
        warn!("Navigation to {} failed ({}); retrying in {:?}", url, last_error, delay);
        tokio::time::sleep(delay).await;
        match page.goto(url, timeout).await {
            Ok(()) => return Ok(()),
            Err(e) => last_error = e,
        }
    }

    Err(last_error)
}
