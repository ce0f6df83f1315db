//! Scripted browser driver for tests.
//!
//! `FakePage` replays a timeline of collect-card batches and canned answers
//! for the in-page scripts, dispatching on the `th:` markers. Public so
//! integration tests and downstream harnesses can script DOM timelines.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::browser::{BrowserDriver, HarvestPage};
use crate::error::ScrapeError;
use crate::extract::scripts;
use crate::models::{CookieEntry, CredentialBundle};

#[derive(Default)]
struct UrlBatches {
    pattern: String,
    queue: VecDeque<Value>,
    last: Value,
}

#[derive(Default)]
struct PageState {
    card_batches: VecDeque<Value>,
    last_batch: Value,
    url_batches: Vec<UrlBatches>,
    current_url: String,
    cutoff: Value,
    sort_tab_present: bool,
    sort_tab_clicked: bool,
    expand_clicks_remaining: usize,
    /// `None` means every selector resolves.
    selectors_present: Option<HashSet<String>>,
    body_text: String,
    goto_error: Option<String>,
    visited: Vec<String>,
    cookies: Vec<CookieEntry>,
}

/// A scripted page. Cloning shares the underlying state so tests can keep a
/// handle for assertions after the harvest consumed the page.
#[derive(Clone, Default)]
pub struct FakePage {
    state: Arc<Mutex<PageState>>,
    scrolls: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
    /// When set, `goto` never returns; used to exercise wall-clock caps.
    hang_on_goto: Arc<AtomicBool>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a collect-cards result. After the queue drains, the last batch
    /// repeats, modelling a page with nothing new to load.
    pub fn push_cards(&self, batch: Value) {
        let mut state = self.state.lock().unwrap();
        state.last_batch = batch.clone();
        state.card_batches.push_back(batch);
    }

    /// Queue a collect-cards result served only while the current URL
    /// contains `url_pattern`. Lets one page replay different DOMs as a
    /// harvester navigates between the profile and each permalink.
    pub fn push_cards_for(&self, url_pattern: &str, batch: Value) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state
            .url_batches
            .iter_mut()
            .find(|e| e.pattern == url_pattern)
        {
            entry.last = batch.clone();
            entry.queue.push_back(batch);
            return;
        }
        state.url_batches.push(UrlBatches {
            pattern: url_pattern.to_string(),
            queue: VecDeque::from([batch.clone()]),
            last: batch,
        });
    }

    pub fn set_cutoff(&self, y: f64) {
        self.state.lock().unwrap().cutoff = json!(y);
    }

    pub fn set_body_text(&self, text: &str) {
        self.state.lock().unwrap().body_text = text.to_string();
    }

    pub fn set_sort_tab_present(&self, present: bool) {
        self.state.lock().unwrap().sort_tab_present = present;
    }

    pub fn set_expand_clicks(&self, count: usize) {
        self.state.lock().unwrap().expand_clicks_remaining = count;
    }

    pub fn set_selectors_present(&self, selectors: &[&str]) {
        self.state.lock().unwrap().selectors_present =
            Some(selectors.iter().map(|s| s.to_string()).collect());
    }

    pub fn fail_goto(&self, message: &str) {
        self.state.lock().unwrap().goto_error = Some(message.to_string());
    }

    pub fn hang_on_goto(&self) {
        self.hang_on_goto.store(true, Ordering::SeqCst);
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.lock().unwrap().visited.clone()
    }

    pub fn cookies(&self) -> Vec<CookieEntry> {
        self.state.lock().unwrap().cookies.clone()
    }

    pub fn sort_tab_clicked(&self) -> bool {
        self.state.lock().unwrap().sort_tab_clicked
    }

    pub fn scroll_count(&self) -> usize {
        self.scrolls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn next_batch(&self) -> Value {
        let mut state = self.state.lock().unwrap();
        let url = state.current_url.clone();
        if let Some(entry) = state
            .url_batches
            .iter_mut()
            .find(|e| !e.pattern.is_empty() && url.contains(&e.pattern))
        {
            return entry.queue.pop_front().unwrap_or_else(|| entry.last.clone());
        }
        state
            .card_batches
            .pop_front()
            .unwrap_or_else(|| state.last_batch.clone())
    }
}

#[async_trait]
impl HarvestPage for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), ScrapeError> {
        if self.hang_on_goto.load(Ordering::SeqCst) {
            // Park until the harvest is cancelled from above.
            loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
        let mut state = self.state.lock().unwrap();
        state.visited.push(url.to_string());
        state.current_url = url.to_string();
        if let Some(message) = state.goto_error.clone() {
            return Err(ScrapeError::Navigation(message));
        }
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<bool, ScrapeError> {
        let state = self.state.lock().unwrap();
        Ok(match &state.selectors_present {
            Some(present) => present.contains(selector),
            None => true,
        })
    }

    async fn set_cookies(&self, cookies: &[CookieEntry]) -> Result<(), ScrapeError> {
        self.state.lock().unwrap().cookies.extend_from_slice(cookies);
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, ScrapeError> {
        if script.contains(scripts::MARKER_CARDS) {
            return Ok(self.next_batch());
        }
        if script.contains(scripts::MARKER_CUTOFF) {
            return Ok(self.state.lock().unwrap().cutoff.clone());
        }
        if script.contains(scripts::MARKER_SORT_TAB) {
            let mut state = self.state.lock().unwrap();
            if state.sort_tab_present && !state.sort_tab_clicked {
                state.sort_tab_clicked = true;
                return Ok(json!(true));
            }
            return Ok(json!(false));
        }
        if script.contains(scripts::MARKER_EXPAND) {
            let mut state = self.state.lock().unwrap();
            if state.expand_clicks_remaining > 0 {
                state.expand_clicks_remaining -= 1;
                return Ok(json!(true));
            }
            return Ok(json!(false));
        }
        if script.contains(scripts::MARKER_SCROLL_LAST)
            || script.contains(scripts::MARKER_SCROLL_COLUMN)
            || script.contains(scripts::MARKER_SCROLL_WINDOW)
            || script.contains(scripts::MARKER_SCROLL_BOTTOM)
        {
            self.scrolls.fetch_add(1, Ordering::SeqCst);
            return Ok(Value::Null);
        }
        Ok(Value::Null)
    }

    async fn click(&self, _selector: &str) -> Result<bool, ScrapeError> {
        Ok(false)
    }

    async fn body_text(&self) -> Result<String, ScrapeError> {
        Ok(self.state.lock().unwrap().body_text.clone())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out scripted pages in order. `failing_launch` models a browser
/// that cannot start, for fallback tests.
#[derive(Default)]
pub struct FakeDriver {
    pages: Mutex<VecDeque<FakePage>>,
    opened: Mutex<Vec<FakePage>>,
    launch_error: Option<String>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_launch(message: &str) -> Self {
        Self {
            launch_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn push_page(&self, page: FakePage) {
        self.pages.lock().unwrap().push_back(page);
    }

    /// Pages handed out so far, for teardown assertions.
    pub fn opened_pages(&self) -> Vec<FakePage> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn open_page(
        &self,
        bundle: Option<&CredentialBundle>,
        _proxy: Option<&str>,
    ) -> Result<Box<dyn HarvestPage>, ScrapeError> {
        if let Some(message) = &self.launch_error {
            return Err(ScrapeError::BrowserLaunch(message.clone()));
        }
        let page = self
            .pages
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ScrapeError::Driver("no scripted page queued".to_string()))?;
        if let Some(bundle) = bundle {
            page.set_cookies(&bundle.cookies).await?;
        }
        self.opened.lock().unwrap().push(page.clone());
        Ok(Box::new(page))
    }

    async fn shutdown(&self) {
        for page in self.opened.lock().unwrap().iter() {
            page.closed.store(true, Ordering::SeqCst);
        }
    }
}

/// Build a collect-cards batch from `(id, text, author, top)` tuples; the
/// id is marked as the `<time>`-anchored one.
pub fn cards(entries: &[(&str, &str, &str, f64)]) -> Value {
    let items: Vec<Value> = entries
        .iter()
        .map(|(id, text, author, top)| {
            json!({
                "ids": [{"id": id, "hasTime": true}],
                "text": text,
                "author": author,
                "top": top,
                "datetime": "2024-11-20T08:30:00Z",
                "likes": "1",
                "replies": "0",
                "reposts": "0",
                "hasPhoto": false,
                "hasVideo": false,
                "cardTitle": null,
            })
        })
        .collect();
    json!(items)
}
