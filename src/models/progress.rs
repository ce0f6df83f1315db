//! Progress records published while a harvest runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stage of a harvest run. `Complete` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStage {
    Init,
    Loading,
    FetchingPosts,
    FetchingReplies,
    Complete,
    Error,
}

impl ScrapeStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// The latest observation of a running harvest, polled by the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeProgress {
    pub stage: ScrapeStage,
    pub posts_found: u64,
    pub replies_found: u64,
    pub current_post: u64,
    pub total_posts: u64,
    pub current_credential: u64,
    pub total_credentials: u64,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

impl ScrapeProgress {
    pub fn new(stage: ScrapeStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            posts_found: 0,
            replies_found: 0,
            current_post: 0,
            total_posts: 0,
            current_credential: 0,
            total_credentials: 0,
            message: message.into(),
            updated_at: Utc::now(),
        }
    }
}
