//! Label sets the extractor matches against, kept as data files so the
//! platform's UI strings can be updated without touching code.

use std::sync::OnceLock;

use regex::Regex;

const EXPANSION_LABELS: &str = include_str!("expansion_labels.txt");
const RECOMMENDATION_HEADINGS: &str = include_str!("recommendation_headings.txt");
const LOGIN_WALL_MARKERS: &str = include_str!("login_wall_markers.txt");

/// "view N replies" teaser shown above a login wall.
const REPLY_TEASER_PATTERN: &str = r"view\s+\d+\s+(?:more\s+)?repl|\d+\s*条回复|查看\s*回复";

/// Sort tab labels for the two reply orderings.
pub const SORT_RECENT_PATTERN: &str = "latest|recency|最新";
pub const SORT_TOP_PATTERN: &str = "top|relevan|热门|热度";

fn alternation(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|")
}

/// Alternation over the folded-branch expansion button labels, for
/// interpolation into the in-page click script.
pub fn expansion_pattern() -> &'static str {
    static PATTERN: OnceLock<String> = OnceLock::new();
    PATTERN.get_or_init(|| alternation(EXPANSION_LABELS))
}

/// Alternation over the "more posts" style headings that separate the
/// conversation from platform recommendations.
pub fn recommendation_pattern() -> &'static str {
    static PATTERN: OnceLock<String> = OnceLock::new();
    PATTERN.get_or_init(|| alternation(RECOMMENDATION_HEADINGS))
}

pub fn expansion_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!("(?i)(?:{})", expansion_pattern())).expect("expansion labels regex")
    })
}

pub fn login_wall_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!("(?i)(?:{})", alternation(LOGIN_WALL_MARKERS)))
            .expect("login wall regex")
    })
}

pub fn reply_teaser_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("(?i)(?:{REPLY_TEASER_PATTERN})")).expect("teaser regex"))
}
