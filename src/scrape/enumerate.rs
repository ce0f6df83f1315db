//! Reply enumeration: the two-phase scroll + bottom-sweep loop.
//!
//! One coherent state machine per root post:
//!
//! ```text
//! SwitchSort ──► ScrollRound ──► ClickExpand ─┐
//!                    ▲                        │  (extra scroll budget)
//!                    └────────────────────────┘
//!                    │  no-new threshold / budget exhausted
//!                    ▼
//!               BottomSweep ──► Done
//! ```
//!
//! Transitions are driven by `new_replies_this_round` and the budget
//! counters; a login wall observed on the first round terminates with an
//! error instead.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info};

use crate::browser::HarvestPage;
use crate::error::ScrapeError;
use crate::extract::{self, labels, scripts};
use crate::models::{ReplyScrapeOptions, SortMode};
use crate::pacing::PacingPolicy;
use crate::scrape::HarvestEmitter;

/// Window scroll distance per round.
const WINDOW_SCROLL_PX: u32 = 1600;
/// Settle time after switching the sort tab.
const SORT_SETTLE: Duration = Duration::from_secs(2);
/// Settle time after each folded-branch expansion click.
const EXPAND_SETTLE: Duration = Duration::from_secs(4);
/// Expansion clicks attempted per scroll round.
const MAX_EXPAND_CLICKS: u32 = 8;
/// Extra scroll rounds granted per successful expansion click.
const EXPAND_EXTRA_ROUNDS: u32 = 5;

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Effort bounds for one enumeration run. Dev builds default to the small
/// budgets; production builds to the large ones; every knob has an env
/// override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumeratorBudgets {
    /// Phase-A scroll rounds.
    pub scroll_budget: u32,
    /// Consecutive no-new rounds that end Phase A early.
    pub max_rounds_no_new: u32,
    /// Scroll delay on reply pages, raised above the pacing default.
    pub reply_scroll_delay_ms: u64,
    /// Phase-B bottom-sweep round cap.
    pub bottom_rounds: u32,
    /// Consecutive no-new bottom sweeps that end Phase B.
    pub bottom_no_new: u32,
}

impl EnumeratorBudgets {
    pub fn from_env() -> Self {
        let dev = cfg!(debug_assertions);
        Self {
            scroll_budget: env_u32("SCRAPER_SCROLL_BUDGET", if dev { 120 } else { 1800 }),
            max_rounds_no_new: env_u32("SCRAPER_MAX_SCROLLS_NO_NEW", if dev { 10 } else { 40 }),
            reply_scroll_delay_ms: env_u64(
                "SCRAPER_REPLY_SCROLL_DELAY_MS",
                if dev { 1200 } else { 4800 },
            ),
            bottom_rounds: env_u32("SCRAPER_BOTTOM_ROUNDS", if dev { 30 } else { 120 }),
            bottom_no_new: env_u32("SCRAPER_BOTTOM_NO_NEW", if dev { 6 } else { 20 }),
        }
    }
}

impl Default for EnumeratorBudgets {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Emits every reply under one root post, deduplicated by id.
pub struct ReplyEnumerator<'a> {
    page: &'a dyn HarvestPage,
    root_id: &'a str,
    options: ReplyScrapeOptions,
    budgets: EnumeratorBudgets,
    pacing: &'a PacingPolicy,
    seen: HashSet<String>,
}

impl<'a> ReplyEnumerator<'a> {
    pub fn new(
        page: &'a dyn HarvestPage,
        root_id: &'a str,
        options: ReplyScrapeOptions,
        budgets: EnumeratorBudgets,
        pacing: &'a PacingPolicy,
    ) -> Self {
        let mut seen = HashSet::new();
        seen.insert(root_id.to_string());
        Self {
            page,
            root_id,
            options,
            budgets,
            pacing,
            seen,
        }
    }

    /// Run the full state machine. Returns the number of replies emitted.
    pub async fn run(&mut self, emitter: &mut HarvestEmitter) -> Result<u64, ScrapeError> {
        self.switch_sort().await?;

        let mut emitted = self.scroll_phase(emitter).await?;
        emitted += self.bottom_sweep(emitter).await?;

        info!("Enumerated {} replies under {}", emitted, self.root_id);
        Ok(emitted)
    }

    /// SwitchSort: at most one tab click; absent tab means the platform
    /// already shows the order it wants to show.
    async fn switch_sort(&self) -> Result<(), ScrapeError> {
        let pattern = match self.options.sort_mode {
            SortMode::Recent => labels::SORT_RECENT_PATTERN,
            SortMode::Top => labels::SORT_TOP_PATTERN,
        };
        let clicked = self
            .page
            .evaluate(&scripts::sort_tab(pattern))
            .await?
            .as_bool()
            .unwrap_or(false);
        if clicked {
            debug!("Switched reply sort for {}", self.root_id);
            tokio::time::sleep(SORT_SETTLE).await;
        }
        Ok(())
    }

    /// Phase A: ScrollRound (⇄ ClickExpand) until the budget or the no-new
    /// threshold is reached.
    async fn scroll_phase(&mut self, emitter: &mut HarvestEmitter) -> Result<u64, ScrapeError> {
        let scroll_delay = self.scroll_delay_ms();
        let mut emitted = 0u64;
        let mut rounds_no_new = 0u32;
        let mut extra_budget = 0u32;
        let mut round = 0u32;

        while round < self.budgets.scroll_budget.saturating_add(extra_budget) {
            let first_round = round == 0;
            round += 1;

            let new_this_round = self.collect_round(emitter, first_round).await?;
            emitted += new_this_round;

            if new_this_round == 0 {
                rounds_no_new += 1;
                if rounds_no_new >= self.budgets.max_rounds_no_new {
                    debug!(
                        "No new replies for {} rounds under {}; ending scroll phase",
                        rounds_no_new, self.root_id
                    );
                    break;
                }
            } else {
                rounds_no_new = 0;
            }

            self.page.evaluate(scripts::SCROLL_LAST_CARD).await?;
            self.page.evaluate(scripts::SCROLL_COLUMN_BOTTOM).await?;
            self.page
                .evaluate(&scripts::scroll_window(WINDOW_SCROLL_PX))
                .await?;
            self.pacing.delay(scroll_delay).await;

            if self.options.expand_folded_replies {
                let clicks = self.click_expansions().await?;
                if clicks > 0 {
                    extra_budget = extra_budget.saturating_add(clicks * EXPAND_EXTRA_ROUNDS);
                }
            }
        }

        Ok(emitted)
    }

    /// ClickExpand: open folded / low-quality branches, one click at a time
    /// so each batch can render before the next.
    async fn click_expansions(&self) -> Result<u32, ScrapeError> {
        let pattern = labels::expansion_pattern();
        let mut clicks = 0u32;
        while clicks < MAX_EXPAND_CLICKS {
            let clicked = self
                .page
                .evaluate(&scripts::expand_one(pattern))
                .await?
                .as_bool()
                .unwrap_or(false);
            if !clicked {
                break;
            }
            clicks += 1;
            tokio::time::sleep(EXPAND_SETTLE).await;
        }
        if clicks > 0 {
            debug!("Expanded {} folded branches under {}", clicks, self.root_id);
        }
        Ok(clicks)
    }

    /// BottomSweep: drain lazy-loaded trailing batches Phase A missed.
    async fn bottom_sweep(&mut self, emitter: &mut HarvestEmitter) -> Result<u64, ScrapeError> {
        let scroll_delay = self.scroll_delay_ms();
        let mut emitted = 0u64;
        let mut no_new = 0u32;

        for _ in 0..self.budgets.bottom_rounds {
            self.page.evaluate(scripts::SCROLL_TO_BOTTOM).await?;
            self.pacing.delay(scroll_delay).await;

            let new_this_round = self.collect_round(emitter, false).await?;
            emitted += new_this_round;

            if new_this_round == 0 {
                no_new += 1;
                if no_new >= self.budgets.bottom_no_new {
                    break;
                }
            } else {
                no_new = 0;
            }
        }

        Ok(emitted)
    }

    /// One enumeration pass: snapshot the cards, drop everything below the
    /// recommendation cutoff, emit unseen replies in DOM order.
    async fn collect_round(
        &mut self,
        emitter: &mut HarvestEmitter,
        check_login_wall: bool,
    ) -> Result<u64, ScrapeError> {
        let raw = self.page.evaluate(scripts::COLLECT_CARDS).await?;
        let cards = extract::parse_cards(&raw);

        if check_login_wall {
            let body = self.page.body_text().await?;
            if extract::detect_reply_login_wall(&body, cards.len()) {
                return Err(ScrapeError::LoginWall);
            }
        }

        let cutoff = extract::parse_cutoff(
            &self
                .page
                .evaluate(&scripts::recommendation_cutoff(
                    labels::recommendation_pattern(),
                ))
                .await?,
        );

        let mut new_count = 0u64;
        for card in &cards {
            if card.top > cutoff {
                continue;
            }
            let Some(reply) = extract::extract_reply(card, self.root_id) else {
                continue;
            };
            if !self.seen.insert(reply.id.clone()) {
                continue;
            }
            emitter.emit_reply(&reply).await?;
            new_count += 1;
        }
        Ok(new_count)
    }

    fn scroll_delay_ms(&self) -> u64 {
        self.budgets
            .reply_scroll_delay_ms
            .max(self.pacing.current().scroll_delay_ms)
    }
}
