//! Root post and reply records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder appended to post text when the card carries a photo.
pub const TAG_IMAGE: &str = "[图片]";
/// Placeholder appended when the card carries an embedded or raw video.
pub const TAG_VIDEO: &str = "[视频]";
/// Placeholder substituted for empty text when the card embeds a link card.
pub const TAG_LINK: &str = "[链接]";

/// Known mis-encodings of the media tags (UTF-8 bytes decoded as
/// Windows-1252) seen in rows written by earlier ingest paths. Normalised
/// to the canonical forms on every write.
const MOJIBAKE_TAGS: &[(&str, &str)] = &[
    ("[å›¾ç‰‡]", TAG_IMAGE),
    ("[è§†é¢‘]", TAG_VIDEO),
    ("[é“¾æŽ¥]", TAG_LINK),
];

/// Replace mis-encoded media tags with their canonical Chinese forms.
pub fn normalize_media_tags(text: &str) -> String {
    let mut out = text.to_string();
    for (broken, canonical) in MOJIBAKE_TAGS {
        if out.contains(broken) {
            out = out.replace(broken, canonical);
        }
    }
    out
}

/// A top-level conversation post whose replies are being harvested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootPost {
    pub id: String,
    pub author_name: String,
    pub author_handle: String,
    /// May be empty; media presence is encoded as bracketed tags.
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub like_count: u64,
    pub reply_count: u64,
    pub repost_count: u64,
}

impl RootPost {
    /// Minimal record for a root that was never observed directly; keeps
    /// reply foreign keys valid.
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            author_name: "Unknown".to_string(),
            author_handle: "unknown".to_string(),
            text: String::new(),
            created_at: chrono::DateTime::UNIX_EPOCH,
            like_count: 0,
            reply_count: 0,
            repost_count: 0,
        }
    }
}

/// A post whose ancestor chain leads to a root post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub id: String,
    /// Id of the root post under whose conversation this reply lives.
    pub root_id: String,
    pub author_id: String,
    pub author_name: String,
    pub author_handle: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub like_count: u64,
    /// Nearest ancestor id within the conversation; falls back to `root_id`.
    pub reply_to: String,
}
