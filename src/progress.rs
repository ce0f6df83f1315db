//! Process-wide progress channel.
//!
//! A keyed register of the latest progress record per harvest target,
//! polled by the UI. Writes merge: `replies_found` only ever grows within
//! one run; everything else is overwritten. Terminal entries linger for a
//! TTL grace period so a poller can still read the final state, then get
//! pruned on later writes.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};
use std::time::{Duration, Instant};

use crate::models::ScrapeProgress;

/// How long terminal entries stay readable after their last update.
const TERMINAL_TTL: Duration = Duration::from_secs(600);

/// Progress key for an account harvest.
pub fn account_key(handle: &str) -> String {
    format!("account:{handle}")
}

/// Progress key for a single-post harvest.
pub fn tweet_key(root_id: &str) -> String {
    format!("tweet:{root_id}")
}

struct Entry {
    progress: ScrapeProgress,
    touched: Instant,
}

pub struct ProgressChannel {
    entries: RwLock<HashMap<String, Entry>>,
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The shared channel used by all harvests in this process.
    pub fn global() -> &'static ProgressChannel {
        static CHANNEL: OnceLock<ProgressChannel> = OnceLock::new();
        CHANNEL.get_or_init(ProgressChannel::new)
    }

    /// Publish the latest progress for `key`. `replies_found` is merged
    /// monotonically: a smaller later observation keeps the stored maximum.
    pub fn set(&self, key: &str, mut progress: ScrapeProgress) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };

        let now = Instant::now();
        entries.retain(|k, e| {
            k.as_str() == key
                || !e.progress.stage.is_terminal()
                || now.duration_since(e.touched) < TERMINAL_TTL
        });

        if let Some(existing) = entries.get(key) {
            progress.replies_found = progress.replies_found.max(existing.progress.replies_found);
        }
        entries.insert(
            key.to_string(),
            Entry {
                progress,
                touched: now,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<ScrapeProgress> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(key).map(|e| e.progress.clone()))
    }

    /// Reset a target before a new run; the monotonic guarantee is scoped
    /// to a single run.
    pub fn clear(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}
