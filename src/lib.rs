//! threadharvest - reply-thread harvester for the X platform.
//!
//! The scraping core behind a monitoring UI: a browser-driven harvest
//! engine with credential rotation and pacing, a reply-enumeration
//! algorithm, an API fallback client, and a polled progress channel.
//! Persistence and configuration are seams ([`storage::HarvestStore`],
//! [`config::ConfigStore`]); the surrounding application owns the real
//! schema and HTTP surface.

pub mod apify;
pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod models;
pub mod orchestrator;
pub mod pacing;
pub mod progress;
pub mod rotation;
pub mod scrape;
pub mod storage;

pub use error::ScrapeError;
pub use models::{Reply, ReplyScrapeOptions, RootPost, ScrapeProgress, ScrapeStage, SortMode};
pub use orchestrator::{Orchestrator, ScrapeMethod, ScrapeOutcome};
