//! DOM extraction: pure functions from in-page snapshots to records.
//!
//! The in-page scripts ([`scripts`]) return plain JSON; everything here is
//! deterministic Rust over that JSON, so the whole module is unit-testable
//! without a browser.

pub mod labels;
pub mod scripts;

use serde::Deserialize;
use serde_json::Value;

use crate::models::{parse_datetime, Reply, RootPost, TAG_IMAGE, TAG_LINK, TAG_VIDEO};

/// One status-id candidate found inside a post card.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawStatusId {
    pub id: String,
    /// Whether the anchor wraps the card's `<time>` element.
    pub has_time: bool,
}

/// Raw snapshot of one post card, as produced by the collect-cards script.
/// Every field is optional in practice; the platform's DOM shifts often.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawPostCard {
    pub ids: Vec<RawStatusId>,
    pub text: String,
    /// Author line as rendered: `"<name>@<handle>"`.
    pub author: String,
    /// Bounding-box top in absolute page coordinates.
    pub top: f64,
    pub datetime: Option<String>,
    pub likes: String,
    pub replies: String,
    pub reposts: String,
    pub has_photo: bool,
    pub has_video: bool,
    pub card_title: Option<String>,
}

/// Parse the collect-cards result. Malformed entries are dropped, not
/// propagated; a half-rendered card must never kill a run.
pub fn parse_cards(value: &Value) -> Vec<RawPostCard> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

/// Parse the recommendation-cutoff result; pages without a recommendation
/// section get an infinite cutoff.
pub fn parse_cutoff(value: &Value) -> f64 {
    value.as_f64().unwrap_or(f64::INFINITY)
}

/// Pick the status id of a card.
///
/// The `<time>`-anchored id is the card's own permalink and wins. A card
/// inside its own conversation may link back to the root; when the
/// preferred id equals `root_id` and other candidates exist, the first
/// non-root id wins instead.
pub fn extract_card_id(card: &RawPostCard, root_id: Option<&str>) -> Option<String> {
    if card.ids.is_empty() {
        return None;
    }
    let preferred = card
        .ids
        .iter()
        .find(|c| c.has_time)
        .or_else(|| card.ids.first())
        .map(|c| c.id.clone())?;

    if let Some(root) = root_id {
        if preferred == root {
            if let Some(other) = card.ids.iter().find(|c| c.id != root) {
                return Some(other.id.clone());
            }
        }
    }
    Some(preferred)
}

/// Parse an engagement count: commas stripped, trailing `K`/`M`/`万`
/// multipliers expanded. Absent or unparseable counts are zero.
pub fn parse_count(raw: Option<&str>) -> u64 {
    let Some(raw) = raw else {
        return 0;
    };
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() {
        return 0;
    }

    let (digits, multiplier) = if let Some(rest) = cleaned.strip_suffix(['K', 'k']) {
        (rest, 1_000.0)
    } else if let Some(rest) = cleaned.strip_suffix(['M', 'm']) {
        (rest, 1_000_000.0)
    } else if let Some(rest) = cleaned.strip_suffix('万') {
        (rest, 10_000.0)
    } else {
        (cleaned.as_str(), 1.0)
    };

    digits
        .trim()
        .parse::<f64>()
        .map(|n| (n * multiplier).round().max(0.0) as u64)
        .unwrap_or(0)
}

/// Split the rendered author line `"<name>@<handle>"`.
pub fn parse_author(author: &str) -> (String, String) {
    match author.split_once('@') {
        Some((name, handle)) => (
            name.trim().to_string(),
            handle.trim().trim_start_matches('@').to_string(),
        ),
        None => (author.trim().to_string(), String::new()),
    }
}

/// Body text with media placeholders applied. Empty text becomes a link
/// placeholder, optionally carrying the embedded card's title; photo and
/// video tags are appended at most once each.
pub fn card_text(card: &RawPostCard) -> String {
    let mut text = card.text.trim().to_string();
    if text.is_empty() {
        text = match card.card_title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => {
                let prefix: String = title.chars().take(50).collect();
                format!("{TAG_LINK} {prefix}")
            }
            _ => TAG_LINK.to_string(),
        };
    }
    if card.has_photo && !text.contains(TAG_IMAGE) {
        text.push(' ');
        text.push_str(TAG_IMAGE);
    }
    if card.has_video && !text.contains(TAG_VIDEO) {
        text.push(' ');
        text.push_str(TAG_VIDEO);
    }
    text
}

/// Build the root record from the conversation's first card. `fallback_id`
/// covers pages where the root card renders without its own permalink
/// anchor (the id is already known from the URL).
pub fn extract_root_post(card: &RawPostCard, fallback_id: Option<&str>) -> Option<RootPost> {
    let id = extract_card_id(card, None).or_else(|| fallback_id.map(|s| s.to_string()))?;
    let (author_name, author_handle) = parse_author(&card.author);
    Some(RootPost {
        id,
        author_name,
        author_handle,
        text: card_text(card),
        created_at: parse_datetime(card.datetime.as_deref().unwrap_or_default()),
        like_count: parse_count(Some(&card.likes)),
        reply_count: parse_count(Some(&card.replies)),
        repost_count: parse_count(Some(&card.reposts)),
    })
}

/// Build a reply record from a card inside the conversation. Returns `None`
/// for the root's own card and for cards without a usable id.
pub fn extract_reply(card: &RawPostCard, root_id: &str) -> Option<Reply> {
    let id = extract_card_id(card, Some(root_id))?;
    if id == root_id {
        return None;
    }
    let (author_name, author_handle) = parse_author(&card.author);
    let author_id = if author_handle.is_empty() {
        "unknown".to_string()
    } else {
        author_handle.clone()
    };
    Some(Reply {
        id,
        root_id: root_id.to_string(),
        author_id,
        author_name,
        author_handle,
        text: card_text(card),
        created_at: parse_datetime(card.datetime.as_deref().unwrap_or_default()),
        like_count: parse_count(Some(&card.likes)),
        reply_to: root_id.to_string(),
    })
}

/// A reply page that shows a login prompt plus a "view N replies" teaser
/// with almost no cards is a login wall, fatal for the current credential.
pub fn detect_reply_login_wall(body_text: &str, card_count: usize) -> bool {
    card_count <= 2
        && labels::login_wall_regex().is_match(body_text)
        && labels::reply_teaser_regex().is_match(body_text)
}
