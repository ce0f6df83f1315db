//! Fallback client for the third-party scraping actor.
//!
//! Contract: submit a run, poll its status, fetch the dataset, persist
//! through the same emitter the browser path uses. Dataset items are
//! shapeless; the parser accepts the union of snake_case and camelCase
//! field names and rejects an item only when its id is absent.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::ScrapeError;
use crate::models::{parse_api_datetime, Reply, RootPost, ScrapeStage, SortMode};
use crate::scrape::HarvestEmitter;

pub const APIFY_BASE_URL: &str = "https://api.apify.com/v2";
/// Actor slug in the API's `user~actor` form.
pub const TWEET_SCRAPER_ACTOR: &str = "apidojo~tweet-scraper";

/// Reply cap per root when the caller does not specify one.
pub const DEFAULT_MAX_REPLIES: usize = 1000;

const POLL_INTERVAL: Duration = Duration::from_secs(3);
const MAX_POLL_ATTEMPTS: u32 = 80;
const QUOTA_MESSAGE: &str = "Monthly usage hard limit exceeded";
/// Progress message cadence while persisting API replies.
const PROGRESS_BATCH: u64 = 20;

fn sort_label(sort: SortMode) -> &'static str {
    match sort {
        SortMode::Recent => "Latest",
        SortMode::Top => "Top",
    }
}

/// One parsed dataset item.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ApiItem {
    pub id: String,
    pub conversation_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub author_id: String,
    pub author_name: String,
    pub author_handle: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub like_count: u64,
    pub reply_count: u64,
    pub repost_count: u64,
}

impl ApiItem {
    pub fn into_root(self) -> RootPost {
        RootPost {
            id: self.id,
            author_name: self.author_name,
            author_handle: self.author_handle,
            text: self.text,
            created_at: self.created_at,
            like_count: self.like_count,
            reply_count: self.reply_count,
            repost_count: self.repost_count,
        }
    }

    pub fn into_reply(self, root_id: &str) -> Reply {
        let reply_to = self
            .in_reply_to
            .clone()
            .unwrap_or_else(|| root_id.to_string());
        Reply {
            id: self.id,
            root_id: root_id.to_string(),
            author_id: self.author_id,
            author_name: self.author_name,
            author_handle: self.author_handle,
            text: self.text,
            created_at: self.created_at,
            like_count: self.like_count,
            reply_to,
        }
    }

    /// Whether this item belongs to the conversation under `root_id`.
    /// Quote-reposts and search strays fail all three checks and are
    /// dropped.
    pub fn belongs_to(&self, root_id: &str) -> bool {
        self.id == root_id
            || self.conversation_id.as_deref() == Some(root_id)
            || self.in_reply_to.as_deref() == Some(root_id)
    }
}

fn str_field(value: &Value, names: &[&str]) -> Option<String> {
    for name in names {
        if let Some(s) = value.get(*name).and_then(|v| v.as_str()) {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
        // Numeric ids appear as numbers in some exports.
        if let Some(n) = value.get(*name).and_then(|v| v.as_u64()) {
            return Some(n.to_string());
        }
    }
    None
}

fn u64_field(value: &Value, names: &[&str]) -> u64 {
    for name in names {
        if let Some(n) = value.get(*name).and_then(|v| v.as_u64()) {
            return n;
        }
        if let Some(n) = value
            .get(*name)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<u64>().ok())
        {
            return n;
        }
    }
    0
}

/// Parse one dataset item. Only a missing id is fatal; everything else
/// falls back to sensible defaults.
pub(crate) fn parse_api_item(item: &Value) -> Option<ApiItem> {
    let id = str_field(item, &["id", "id_str", "tweetId", "tweet_id"])?;

    let author = item
        .get("author")
        .or_else(|| item.get("user"))
        .cloned()
        .unwrap_or(Value::Null);

    Some(ApiItem {
        id,
        conversation_id: str_field(item, &["conversationId", "conversation_id"]),
        in_reply_to: str_field(
            item,
            &["inReplyToStatusId", "in_reply_to_status_id", "inReplyToId"],
        ),
        author_id: str_field(&author, &["id", "id_str"]).unwrap_or_else(|| "unknown".to_string()),
        author_name: str_field(&author, &["name"]).unwrap_or_else(|| "Unknown".to_string()),
        author_handle: str_field(&author, &["userName", "username", "screen_name", "screenName"])
            .unwrap_or_else(|| "unknown".to_string()),
        text: str_field(item, &["text", "fullText", "full_text"]).unwrap_or_default(),
        created_at: str_field(item, &["createdAt", "created_at"])
            .map(|s| parse_api_datetime(&s))
            .unwrap_or(DateTime::UNIX_EPOCH),
        like_count: u64_field(item, &["likeCount", "like_count", "favoriteCount", "favorite_count"]),
        reply_count: u64_field(item, &["replyCount", "reply_count"]),
        repost_count: u64_field(item, &["retweetCount", "retweet_count", "repostCount"]),
    })
}

struct RunInfo {
    run_id: String,
    dataset_id: Option<String>,
}

/// Driver for the scraping actor.
pub struct ApifyClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApifyClient {
    pub fn new(token: &str, proxy: Option<&str>) -> Result<Self, ScrapeError> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(60));
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        Ok(Self {
            http: builder.build()?,
            base_url: APIFY_BASE_URL.to_string(),
            token: token.to_string(),
        })
    }

    /// Point the client at another API origin (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch and persist every reply under a known root id. Returns
    /// `(roots_emitted, replies_emitted)`.
    pub async fn scrape_replies(
        &self,
        emitter: &mut HarvestEmitter,
        root_id: &str,
        max_replies: usize,
        sort: SortMode,
    ) -> Result<(u64, u64), ScrapeError> {
        emitter.publish(
            ScrapeStage::Loading,
            format!("Submitting API run for {root_id}"),
        );
        let (root, replies) = self.fetch_conversation(root_id, max_replies, sort).await?;

        emitter.set_post_index(1, 1);
        // Root first, synthesised when the dataset lacked it.
        emitter
            .emit_root(&root.unwrap_or_else(|| RootPost::placeholder(root_id)))
            .await?;
        let emitted = self.emit_replies(emitter, &replies).await?;
        Ok((1, emitted))
    }

    /// Fetch a user's recent timeline, then fan out to the reply driver for
    /// each root. Returns `(roots_emitted, replies_emitted)`.
    pub async fn scrape_timeline(
        &self,
        emitter: &mut HarvestEmitter,
        handle: &str,
        max_posts: usize,
        sort: SortMode,
    ) -> Result<(u64, u64), ScrapeError> {
        emitter.publish(
            ScrapeStage::FetchingPosts,
            format!("Submitting API timeline run for @{handle}"),
        );

        let input = json!({
            "searchTerms": [format!("from:{handle}")],
            "sort": "Latest",
            "maxItems": max_posts,
        });
        let items = self.run_to_items(&input).await?;

        let mut roots: Vec<RootPost> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for item in &items {
            if roots.len() >= max_posts {
                break;
            }
            let Some(parsed) = parse_api_item(item) else {
                continue;
            };
            if seen.insert(parsed.id.clone()) {
                roots.push(parsed.into_root());
            }
        }
        info!("API timeline returned {} roots for @{}", roots.len(), handle);

        let total = roots.len() as u64;
        let mut replies_total = 0u64;
        for (index, root) in roots.iter().enumerate() {
            emitter.set_post_index(index as u64 + 1, total);
            emitter.emit_root(root).await?;

            let (_, replies) = self
                .fetch_conversation(&root.id, DEFAULT_MAX_REPLIES, sort)
                .await?;
            replies_total += self.emit_replies(emitter, &replies).await?;
        }

        Ok((total, replies_total))
    }

    /// One conversation fetch: run → poll → dataset → filter.
    async fn fetch_conversation(
        &self,
        root_id: &str,
        max_replies: usize,
        sort: SortMode,
    ) -> Result<(Option<RootPost>, Vec<Reply>), ScrapeError> {
        let input = json!({
            "searchTerms": [format!("conversation_id:{root_id}")],
            "sort": sort_label(sort),
            "maxItems": max_replies + 1,
        });
        let items = self.run_to_items(&input).await?;

        let mut root: Option<RootPost> = None;
        let mut replies: Vec<Reply> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for item in &items {
            let Some(parsed) = parse_api_item(item) else {
                continue;
            };
            if !parsed.belongs_to(root_id) {
                debug!("Dropping stray item {} outside conversation {}", parsed.id, root_id);
                continue;
            }
            if !seen.insert(parsed.id.clone()) {
                continue;
            }
            if parsed.id == root_id {
                root = Some(parsed.into_root());
            } else {
                replies.push(parsed.into_reply(root_id));
            }
        }

        debug!(
            "Conversation {}: {} replies (root present: {})",
            root_id,
            replies.len(),
            root.is_some()
        );
        Ok((root, replies))
    }

    async fn emit_replies(
        &self,
        emitter: &mut HarvestEmitter,
        replies: &[Reply],
    ) -> Result<u64, ScrapeError> {
        let mut emitted = 0u64;
        for reply in replies {
            emitter.emit_reply(reply).await?;
            emitted += 1;
            if emitted % PROGRESS_BATCH == 0 {
                emitter.publish(
                    ScrapeStage::FetchingReplies,
                    format!("Persisted {emitted} replies via API"),
                );
            }
        }
        Ok(emitted)
    }

    async fn run_to_items(&self, input: &Value) -> Result<Vec<Value>, ScrapeError> {
        let run = self.start_run(input).await?;
        let dataset_id = self.wait_for_run(&run).await?;
        self.dataset_items(&dataset_id).await
    }

    async fn start_run(&self, input: &Value) -> Result<RunInfo, ScrapeError> {
        let url = format!(
            "{}/acts/{}/runs?token={}",
            self.base_url, TWEET_SCRAPER_ACTOR, self.token
        );
        let response = self.http.post(&url).json(input).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if body.contains(QUOTA_MESSAGE) {
            return Err(ScrapeError::ApiQuotaExhausted);
        }
        if !status.is_success() {
            return Err(ScrapeError::Api(format!(
                "run submission failed (HTTP {status}): {body}"
            )));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ScrapeError::Api(format!("malformed run response: {e}")))?;
        let data = value.get("data").unwrap_or(&value);
        let run_id = data
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ScrapeError::Api("run response carried no run id".to_string()))?
            .to_string();
        let dataset_id = data
            .get("defaultDatasetId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        debug!("Started actor run {}", run_id);
        Ok(RunInfo { run_id, dataset_id })
    }

    async fn wait_for_run(&self, run: &RunInfo) -> Result<String, ScrapeError> {
        let url = format!(
            "{}/actor-runs/{}?token={}",
            self.base_url, run.run_id, self.token
        );

        for attempt in 1..=MAX_POLL_ATTEMPTS {
            let value: Value = self.http.get(&url).send().await?.json().await?;
            let data = value.get("data").unwrap_or(&value);
            let status = data.get("status").and_then(|v| v.as_str()).unwrap_or("UNKNOWN");

            match status {
                "RUNNING" | "READY" => {
                    if attempt % 10 == 0 {
                        info!("Actor run {} still running ({} polls)", run.run_id, attempt);
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                "SUCCEEDED" => {
                    return data
                        .get("defaultDatasetId")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string())
                        .or_else(|| run.dataset_id.clone())
                        .ok_or_else(|| {
                            ScrapeError::Api(format!(
                                "actor run {} succeeded without a dataset id",
                                run.run_id
                            ))
                        });
                }
                other => {
                    warn!("Actor run {} ended with status {}", run.run_id, other);
                    return Err(ScrapeError::Api(format!(
                        "actor run {} ended with status {other}",
                        run.run_id
                    )));
                }
            }
        }

        Err(ScrapeError::Api(format!(
            "actor run {} still running after {} poll attempts",
            run.run_id, MAX_POLL_ATTEMPTS
        )))
    }

    async fn dataset_items(&self, dataset_id: &str) -> Result<Vec<Value>, ScrapeError> {
        let url = format!(
            "{}/datasets/{}/items?token={}",
            self.base_url, dataset_id, self.token
        );
        let value: Value = self.http.get(&url).send().await?.json().await?;
        value
            .as_array()
            .cloned()
            .ok_or_else(|| ScrapeError::Api(format!("dataset {dataset_id} items were not an array")))
    }
}
