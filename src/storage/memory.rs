//! In-memory store for tests and embedders without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::ConfigStore;
use crate::error::ScrapeError;
use crate::models::{normalize_media_tags, Reply, RootPost};
use crate::storage::HarvestStore;

#[derive(Default)]
struct MemoryState {
    root_posts: HashMap<String, RootPost>,
    replies: HashMap<String, Reply>,
    /// Insertion order of reply ids, for emission-order assertions.
    reply_order: Vec<String>,
    config: HashMap<String, String>,
}

/// Keeps everything behind one mutex; fine for the write rates a harvest
/// produces.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_posts(&self) -> Vec<RootPost> {
        self.state
            .lock()
            .map(|s| s.root_posts.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn root_post(&self, id: &str) -> Option<RootPost> {
        self.state.lock().ok()?.root_posts.get(id).cloned()
    }

    /// Replies under one root in first-seen order, excluding any row whose
    /// id equals the root id.
    pub fn replies_for_root(&self, root_id: &str) -> Vec<Reply> {
        let Ok(state) = self.state.lock() else {
            return Vec::new();
        };
        state
            .reply_order
            .iter()
            .filter_map(|id| state.replies.get(id))
            .filter(|r| r.root_id == root_id && r.id != root_id)
            .cloned()
            .collect()
    }

    pub fn reply_count(&self) -> usize {
        self.state.lock().map(|s| s.replies.len()).unwrap_or(0)
    }
}

#[async_trait]
impl HarvestStore for MemoryStore {
    async fn upsert_root_post(&self, post: &RootPost) -> Result<(), ScrapeError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ScrapeError::Config("memory store poisoned".to_string()))?;
        let mut record = post.clone();
        record.text = normalize_media_tags(&record.text);
        if let Some(existing) = state.root_posts.get(&post.id) {
            record.created_at = existing.created_at;
        }
        state.root_posts.insert(post.id.clone(), record);
        Ok(())
    }

    async fn upsert_reply(&self, reply: &Reply) -> Result<(), ScrapeError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ScrapeError::Config("memory store poisoned".to_string()))?;
        let mut record = reply.clone();
        record.text = normalize_media_tags(&record.text);
        if let Some(existing) = state.replies.get(&reply.id) {
            record.created_at = existing.created_at;
        } else {
            state.reply_order.push(reply.id.clone());
        }
        state.replies.insert(reply.id.clone(), record);
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ScrapeError> {
        Ok(self
            .state
            .lock()
            .map_err(|_| ScrapeError::Config("memory store poisoned".to_string()))?
            .config
            .get(key)
            .cloned())
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        _description: Option<&str>,
    ) -> Result<(), ScrapeError> {
        self.state
            .lock()
            .map_err(|_| ScrapeError::Config("memory store poisoned".to_string()))?
            .config
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
