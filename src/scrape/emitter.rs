//! Shared emission path for harvested records.
//!
//! Both the browser harvesters and the API client persist through one
//! emitter, which enforces the ordering contract by construction: a root is
//! upserted before any of its replies, every emission updates the progress
//! channel, and callback errors never escape.

use std::sync::Arc;

use tracing::warn;

use crate::error::ScrapeError;
use crate::models::{Reply, RootPost, ScrapeProgress, ScrapeStage};
use crate::progress::ProgressChannel;
use crate::storage::HarvestStore;

/// Optional hooks invoked after a record is validated and persisted.
/// Hook errors are logged and swallowed.
#[derive(Default)]
pub struct HarvestCallbacks {
    pub on_root_post: Option<Box<dyn Fn(&RootPost) -> anyhow::Result<()> + Send + Sync>>,
    pub on_reply: Option<Box<dyn Fn(&Reply) -> anyhow::Result<()> + Send + Sync>>,
}

pub struct HarvestEmitter {
    store: Arc<dyn HarvestStore>,
    callbacks: Arc<HarvestCallbacks>,
    key: String,
    posts_found: u64,
    replies_found: u64,
    current_post: u64,
    total_posts: u64,
    current_credential: u64,
    total_credentials: u64,
}

impl HarvestEmitter {
    pub fn new(store: Arc<dyn HarvestStore>, key: String, callbacks: Arc<HarvestCallbacks>) -> Self {
        Self {
            store,
            callbacks,
            key,
            posts_found: 0,
            replies_found: 0,
            current_post: 0,
            total_posts: 0,
            current_credential: 0,
            total_credentials: 0,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn posts_found(&self) -> u64 {
        self.posts_found
    }

    pub fn replies_found(&self) -> u64 {
        self.replies_found
    }

    pub fn set_credentials(&mut self, current: u64, total: u64) {
        self.current_credential = current;
        self.total_credentials = total;
    }

    pub fn set_post_index(&mut self, current: u64, total: u64) {
        self.current_post = current;
        self.total_posts = total;
    }

    /// Publish the current counters under `stage`.
    pub fn publish(&self, stage: ScrapeStage, message: impl Into<String>) {
        let mut progress = ScrapeProgress::new(stage, message);
        progress.posts_found = self.posts_found;
        progress.replies_found = self.replies_found;
        progress.current_post = self.current_post;
        progress.total_posts = self.total_posts;
        progress.current_credential = self.current_credential;
        progress.total_credentials = self.total_credentials;
        ProgressChannel::global().set(&self.key, progress);
    }

    pub async fn emit_root(&mut self, root: &RootPost) -> Result<(), ScrapeError> {
        self.store.upsert_root_post(root).await?;
        if let Some(hook) = &self.callbacks.on_root_post {
            if let Err(e) = hook(root) {
                warn!("on_root_post callback failed for {}: {}", root.id, e);
            }
        }
        self.posts_found += 1;
        self.publish(
            ScrapeStage::FetchingPosts,
            format!("Collected root post {} by @{}", root.id, root.author_handle),
        );
        Ok(())
    }

    pub async fn emit_reply(&mut self, reply: &Reply) -> Result<(), ScrapeError> {
        // The root must never masquerade as its own reply.
        if reply.id == reply.root_id {
            return Ok(());
        }
        self.store.upsert_reply(reply).await?;
        if let Some(hook) = &self.callbacks.on_reply {
            if let Err(e) = hook(reply) {
                warn!("on_reply callback failed for {}: {}", reply.id, e);
            }
        }
        self.replies_found += 1;
        self.publish(
            ScrapeStage::FetchingReplies,
            format!("Fetched {} replies", self.replies_found),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress;
    use crate::storage::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn root(id: &str) -> RootPost {
        RootPost {
            id: id.to_string(),
            author_name: "Demo".to_string(),
            author_handle: "demo".to_string(),
            text: "hi".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            like_count: 0,
            reply_count: 0,
            repost_count: 0,
        }
    }

    fn reply(id: &str, root_id: &str) -> Reply {
        Reply {
            id: id.to_string(),
            root_id: root_id.to_string(),
            author_id: "u".to_string(),
            author_name: "U".to_string(),
            author_handle: "u".to_string(),
            text: "t".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            like_count: 0,
            reply_to: root_id.to_string(),
        }
    }

    #[tokio::test]
    async fn emitting_updates_store_and_progress() {
        let store = Arc::new(MemoryStore::new());
        let key = progress::tweet_key("emitter-basic");
        let mut emitter =
            HarvestEmitter::new(store.clone(), key.clone(), Arc::new(HarvestCallbacks::default()));

        emitter.emit_root(&root("emitter-basic")).await.unwrap();
        emitter.emit_reply(&reply("r1", "emitter-basic")).await.unwrap();
        emitter.emit_reply(&reply("r2", "emitter-basic")).await.unwrap();

        assert_eq!(store.replies_for_root("emitter-basic").len(), 2);
        let seen = progress::ProgressChannel::global().get(&key).unwrap();
        assert_eq!(seen.replies_found, 2);
        assert_eq!(seen.posts_found, 1);
    }

    #[tokio::test]
    async fn root_id_disguised_as_reply_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let mut emitter = HarvestEmitter::new(
            store.clone(),
            progress::tweet_key("emitter-guard"),
            Arc::new(HarvestCallbacks::default()),
        );

        emitter
            .emit_reply(&reply("emitter-guard", "emitter-guard"))
            .await
            .unwrap();
        assert_eq!(emitter.replies_found(), 0);
        assert_eq!(store.reply_count(), 0);
    }

    #[tokio::test]
    async fn callback_errors_are_swallowed() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let callbacks = HarvestCallbacks {
            on_reply: Some(Box::new(|_| {
                CALLS.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("hook exploded")
            })),
            ..HarvestCallbacks::default()
        };

        let store = Arc::new(MemoryStore::new());
        let mut emitter = HarvestEmitter::new(
            store.clone(),
            progress::tweet_key("emitter-hooks"),
            Arc::new(callbacks),
        );

        emitter.emit_reply(&reply("r1", "emitter-hooks")).await.unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.replies_found(), 1);
    }
}
