//! Persistence seam for harvested records.
//!
//! The core only sees the narrow [`HarvestStore`] trait; the surrounding
//! application owns the real schema. A SQLite reference implementation and
//! an in-memory store live here.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::ScrapeError;
use crate::models::{Reply, RootPost};

/// Idempotent upserts keyed by `id`. Re-inserting refreshes engagement
/// counts and the fetched-at instant but never `created_at`.
#[async_trait]
pub trait HarvestStore: Send + Sync {
    async fn upsert_root_post(&self, post: &RootPost) -> Result<(), ScrapeError>;
    async fn upsert_reply(&self, reply: &Reply) -> Result<(), ScrapeError>;
}
