//! Account-page harvester: collect a profile's recent roots, then enumerate
//! replies under each.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info};

use crate::browser::HarvestPage;
use crate::error::ScrapeError;
use crate::extract::{self, labels, scripts};
use crate::models::{ReplyScrapeOptions, RootPost, ScrapeStage};
use crate::pacing::PacingPolicy;
use crate::scrape::{
    goto_with_retry, EnumeratorBudgets, HarvestEmitter, ReplyEnumerator, NAV_TIMEOUT,
    PLATFORM_HOST, POST_CARD_SELECTOR, TAB_LIST_SELECTOR,
};

/// Wait for the profile skeleton (tab list + first card).
const PROFILE_WAIT: Duration = Duration::from_secs(15);
/// Reply-page card wait when visiting each permalink.
const REPLY_PAGE_WAIT: Duration = Duration::from_secs(15);
/// Consecutive no-new collection rounds that end root collection early;
/// the requested count is only an upper bound.
const COLLECT_NO_NEW_LIMIT: u32 = 5;

/// Harvest up to `max_posts` recent root posts from a profile and every
/// reply under each. Returns `(roots_emitted, replies_emitted)`.
pub async fn harvest_account(
    page: &dyn HarvestPage,
    emitter: &mut HarvestEmitter,
    handle: &str,
    max_posts: usize,
    options: ReplyScrapeOptions,
    budgets: EnumeratorBudgets,
    pacing: &PacingPolicy,
) -> Result<(u64, u64), ScrapeError> {
    emitter.publish(ScrapeStage::Loading, format!("Loading profile @{handle}"));

    let profile_url = format!("https://{PLATFORM_HOST}/{handle}");
    goto_with_retry(page, &profile_url, NAV_TIMEOUT).await?;

    let _ = page.wait_for_selector(TAB_LIST_SELECTOR, PROFILE_WAIT).await?;
    let has_cards = page.wait_for_selector(POST_CARD_SELECTOR, PROFILE_WAIT).await?;
    pacing.page_load_delay().await;

    if !has_cards {
        let body = page.body_text().await?;
        if labels::login_wall_regex().is_match(&body) {
            return Err(ScrapeError::LoginWall);
        }
        info!("Profile @{} shows no posts", handle);
        emitter.publish(ScrapeStage::Complete, format!("@{handle} has no visible posts"));
        return Ok((0, 0));
    }

    let roots = collect_roots(page, emitter, handle, max_posts, pacing).await?;
    info!("Collected {} root posts from @{}", roots.len(), handle);

    let total = roots.len() as u64;
    for (index, root) in roots.iter().enumerate() {
        emitter.set_post_index(index as u64 + 1, total);
        emitter.emit_root(root).await?;

        let permalink = format!("https://{PLATFORM_HOST}/i/status/{}", root.id);
        goto_with_retry(page, &permalink, NAV_TIMEOUT).await?;
        let _ = page.wait_for_selector(POST_CARD_SELECTOR, REPLY_PAGE_WAIT).await?;
        pacing.page_load_delay().await;

        let mut enumerator =
            ReplyEnumerator::new(page, &root.id, options, budgets.clone(), pacing);
        enumerator.run(emitter).await?;

        if index + 1 < roots.len() {
            pacing.between_posts_delay().await;
        }
    }

    Ok((total, emitter.replies_found()))
}

/// Scroll the profile until `max_posts` unique roots above the
/// recommendation cutoff are collected, or nothing new shows up.
async fn collect_roots(
    page: &dyn HarvestPage,
    emitter: &mut HarvestEmitter,
    handle: &str,
    max_posts: usize,
    pacing: &PacingPolicy,
) -> Result<Vec<RootPost>, ScrapeError> {
    emitter.publish(
        ScrapeStage::FetchingPosts,
        format!("Collecting up to {max_posts} posts from @{handle}"),
    );

    let mut roots: Vec<RootPost> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut no_new = 0u32;
    let max_rounds = (max_posts as u32).saturating_mul(4).clamp(10, 200);

    for _ in 0..max_rounds {
        let raw = page.evaluate(scripts::COLLECT_CARDS).await?;
        let cards = extract::parse_cards(&raw);
        let cutoff = extract::parse_cutoff(
            &page
                .evaluate(&scripts::recommendation_cutoff(
                    labels::recommendation_pattern(),
                ))
                .await?,
        );

        let mut new_this_round = 0u32;
        for card in &cards {
            if roots.len() >= max_posts {
                break;
            }
            if card.top > cutoff {
                continue;
            }
            let Some(root) = extract::extract_root_post(card, None) else {
                continue;
            };
            if !seen.insert(root.id.clone()) {
                continue;
            }
            roots.push(root);
            new_this_round += 1;
        }

        if roots.len() >= max_posts {
            break;
        }
        if new_this_round == 0 {
            no_new += 1;
            if no_new >= COLLECT_NO_NEW_LIMIT {
                debug!("No new roots on @{} after {} quiet rounds", handle, no_new);
                break;
            }
        } else {
            no_new = 0;
        }

        page.evaluate(scripts::SCROLL_LAST_CARD).await?;
        page.evaluate(scripts::SCROLL_TO_BOTTOM).await?;
        pacing.scroll_delay().await;
    }

    Ok(roots)
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
            between_posts_delay_ms: 10,
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
    async fn cutoff_limits_collected_roots() {
        let page = FakePage::new();
        page.set_cutoff(350.0);
        // Three posts above the "More posts" heading, two below.
        page.push_cards(cards(&[
            ("A", "post a", "Demo@demo", 100.0),
            ("B", "post b", "Demo@demo", 200.0),
            ("C", "post c", "Demo@demo", 300.0),
            ("X", "recommended", "Other@other", 400.0),
            ("Y", "recommended", "Other@other", 500.0),
        ]));

        let store = Arc::new(MemoryStore::new());
        let mut emitter = HarvestEmitter::new(
            store,
            progress::account_key("cutoff-demo"),
            Arc::new(HarvestCallbacks::default()),
        );
        let pacing = quiet_pacing();

        let roots = collect_roots(&page, &mut emitter, "cutoff-demo", 10, &pacing)
            .await
            .unwrap();
        let ids: Vec<_> = roots.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn collection_stops_at_max_posts() {
        let page = FakePage::new();
        page.push_cards(cards(&[
            ("A", "a", "Demo@demo", 100.0),
            ("B", "b", "Demo@demo", 200.0),
            ("C", "c", "Demo@demo", 300.0),
        ]));

        let store = Arc::new(MemoryStore::new());
        let mut emitter = HarvestEmitter::new(
            store,
            progress::account_key("max-demo"),
            Arc::new(HarvestCallbacks::default()),
        );
        let pacing = quiet_pacing();

        let roots = collect_roots(&page, &mut emitter, "max-demo", 2, &pacing)
            .await
            .unwrap();
        assert_eq!(roots.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_profile_with_login_prompt_is_a_login_wall() {
        let page = FakePage::new();
        page.set_selectors_present(&[TAB_LIST_SELECTOR]);
        page.set_body_text("Log in\nDon't miss what's happening");

        let store = Arc::new(MemoryStore::new());
        let mut emitter = HarvestEmitter::new(
            store,
            progress::account_key("walled-profile"),
            Arc::new(HarvestCallbacks::default()),
        );
        let pacing = quiet_pacing();

        let err = harvest_account(
            &page,
            &mut emitter,
            "walled-profile",
            3,
            ReplyScrapeOptions::default(),
            tight_budgets(),
            &pacing,
        )
        .await
        .expect_err("login wall");
        assert!(matches!(err, ScrapeError::LoginWall));
    }
}
