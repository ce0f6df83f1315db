//! Single-post harvester: one root post URL, then the reply enumerator.

use std::time::Duration;

use tracing::{info, warn};

use crate::browser::HarvestPage;
use crate::error::ScrapeError;
use crate::extract::{self, labels, scripts};
use crate::models::{ReplyScrapeOptions, RootPost, ScrapeStage};
use crate::pacing::PacingPolicy;
use crate::scrape::{
    goto_with_retry, EnumeratorBudgets, HarvestEmitter, ReplyEnumerator, LEGACY_HOST,
    NAV_TIMEOUT, PLATFORM_HOST, POST_CARD_SELECTOR,
};

/// Post-card wait after DOM content loaded.
const SINGLE_POST_WAIT: Duration = Duration::from_secs(25);
/// Extra settle time for the SPA to hydrate the conversation.
const SPA_SETTLE: Duration = Duration::from_secs(4);

/// Harvest one root post and every reply under it. Returns
/// `(roots_emitted, replies_emitted)`.
pub async fn harvest_single_post(
    page: &dyn HarvestPage,
    emitter: &mut HarvestEmitter,
    root_id: &str,
    options: ReplyScrapeOptions,
    budgets: EnumeratorBudgets,
    pacing: &PacingPolicy,
) -> Result<(u64, u64), ScrapeError> {
    emitter.publish(ScrapeStage::Loading, format!("Opening post {root_id}"));

    let candidates = [
        format!("https://{PLATFORM_HOST}/i/status/{root_id}"),
        format!("https://{LEGACY_HOST}/i/status/{root_id}"),
    ];
    let mut navigated = false;
    let mut last_error: Option<ScrapeError> = None;
    for url in &candidates {
        match goto_with_retry(page, url, NAV_TIMEOUT).await {
            Ok(()) => {
                navigated = true;
                break;
            }
            Err(e) => {
                warn!("Could not open {}: {}", url, e);
                last_error = Some(e);
            }
        }
    }
    if !navigated {
        return Err(last_error
            .unwrap_or_else(|| ScrapeError::Navigation("no permalink candidate".to_string())));
    }

    let found = page.wait_for_selector(POST_CARD_SELECTOR, SINGLE_POST_WAIT).await?;
    tokio::time::sleep(SPA_SETTLE).await;

    if !found {
        // Differentiate "login required" from "gone" by body-text probes.
        let body = page.body_text().await?;
        if labels::login_wall_regex().is_match(&body) {
            return Err(ScrapeError::LoginWall);
        }
        return Err(ScrapeError::PostUnavailable(format!(
            "post {root_id} is deleted, restricted, or not visible"
        )));
    }

    let raw = page.evaluate(scripts::COLLECT_CARDS).await?;
    let cards = extract::parse_cards(&raw);

    let body = page.body_text().await?;
    if extract::detect_reply_login_wall(&body, cards.len()) {
        return Err(ScrapeError::LoginWall);
    }
    if cards.is_empty() {
        return Err(ScrapeError::PostUnavailable(format!(
            "post {root_id} rendered no conversation"
        )));
    }

    // The root is the card whose own permalink matches; when it is hidden
    // behind a thread fold a placeholder keeps downstream keys valid.
    let root = cards
        .iter()
        .find_map(|card| {
            let candidate = extract::extract_root_post(card, None)?;
            (candidate.id == root_id).then_some(candidate)
        })
        .unwrap_or_else(|| RootPost::placeholder(root_id));

    emitter.set_post_index(1, 1);
    emitter.emit_root(&root).await?;
    info!("Harvesting replies under {} by @{}", root.id, root.author_handle);

    pacing.page_load_delay().await;

    let mut enumerator = ReplyEnumerator::new(page, root_id, options, budgets, pacing);
    let replies = enumerator.run(emitter).await?;

    Ok((1, replies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{cards, FakePage};
    use crate::pacing::{PacingConfig, PacingPolicy};
    use crate::progress;
    use crate::scrape::HarvestCallbacks;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn quiet_pacing() -> PacingPolicy {
        PacingPolicy::new(PacingConfig {
            page_load_delay_ms: 0,
            scroll_delay_ms: 10,
            between_posts_delay_ms: 0,
            random_jitter: false,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
        })
    }

    fn tight_budgets() -> EnumeratorBudgets {
        EnumeratorBudgets {
            scroll_budget: 4,
            max_rounds_no_new: 2,
            reply_scroll_delay_ms: 10,
            bottom_rounds: 2,
            bottom_no_new: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_emits_root_then_replies() {
        let root_id = "1728108619189874825";
        let page = FakePage::new();
        page.push_cards(cards(&[
            (root_id, "root text", "Root Author@rootauthor", 10.0),
            ("9001", "first reply", "A@a", 100.0),
            ("9002", "second reply", "B@b", 200.0),
        ]));

        let store = Arc::new(MemoryStore::new());
        let mut emitter = HarvestEmitter::new(
            store.clone(),
            progress::tweet_key(root_id),
            Arc::new(HarvestCallbacks::default()),
        );
        let pacing = quiet_pacing();

        let (roots, replies) = harvest_single_post(
            &page,
            &mut emitter,
            root_id,
            ReplyScrapeOptions::default(),
            tight_budgets(),
            &pacing,
        )
        .await
        .unwrap();

        assert_eq!((roots, replies), (1, 2));
        assert_eq!(store.root_post(root_id).unwrap().author_handle, "rootauthor");
        let stored = store.replies_for_root(root_id);
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|r| r.reply_to == root_id));
        // Tried the canonical permalink first.
        assert!(page.visited()[0].contains("x.com/i/status/"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_card_with_login_prompt_is_a_login_wall() {
        let page = FakePage::new();
        page.set_selectors_present(&[]);
        page.set_body_text("Sign in to X");

        let store = Arc::new(MemoryStore::new());
        let mut emitter = HarvestEmitter::new(
            store.clone(),
            progress::tweet_key("walled"),
            Arc::new(HarvestCallbacks::default()),
        );
        let pacing = quiet_pacing();

        let err = harvest_single_post(
            &page,
            &mut emitter,
            "walled",
            ReplyScrapeOptions::default(),
            tight_budgets(),
            &pacing,
        )
        .await
        .expect_err("login wall");
        assert!(matches!(err, ScrapeError::LoginWall));
        assert_eq!(store.reply_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_card_without_prompt_is_unavailable() {
        let page = FakePage::new();
        page.set_selectors_present(&[]);
        page.set_body_text("Hmm...this page doesn't exist. Try searching for something else.");

        let store = Arc::new(MemoryStore::new());
        let mut emitter = HarvestEmitter::new(
            store,
            progress::tweet_key("gone"),
            Arc::new(HarvestCallbacks::default()),
        );
        let pacing = quiet_pacing();

        let err = harvest_single_post(
            &page,
            &mut emitter,
            "gone",
            ReplyScrapeOptions::default(),
            tight_budgets(),
            &pacing,
        )
        .await
        .expect_err("unavailable");
        assert!(matches!(err, ScrapeError::PostUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_the_legacy_host() {
        let page = FakePage::new();
        page.push_cards(cards(&[("55", "root", "R@r", 10.0)]));
        // Every navigation fails with a retryable error, so the harvester
        // exhausts retries on the canonical host, moves to the legacy host,
        // and finally surfaces the captured network error.
        page.fail_goto("net::ERR_CONNECTION_RESET");

        let store = Arc::new(MemoryStore::new());
        let mut emitter = HarvestEmitter::new(
            store,
            progress::tweet_key("55"),
            Arc::new(HarvestCallbacks::default()),
        );
        let pacing = quiet_pacing();

        let err = harvest_single_post(
            &page,
            &mut emitter,
            "55",
            ReplyScrapeOptions::default(),
            tight_budgets(),
            &pacing,
        )
        .await
        .expect_err("both hosts down");
        assert!(matches!(err, ScrapeError::Navigation(_)));
        // Retried on both hosts.
        let visited = page.visited();
        assert!(visited.iter().any(|u| u.contains("x.com")));
        assert!(visited.iter().any(|u| u.contains("twitter.com")));
    }
}
