//! Options controlling one reply harvest.

use serde::{Deserialize, Serialize};

/// Reply ordering requested from the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    Recent,
    Top,
}

impl SortMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "recent" | "latest" => Some(Self::Recent),
            "top" => Some(Self::Top),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyScrapeOptions {
    pub sort_mode: SortMode,
    /// Also expand folded / low-quality branches ("show more replies",
    /// "probable spam") at the cost of extra scroll budget.
    pub expand_folded_replies: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_mode_parse() {
        assert_eq!(SortMode::parse("recent"), Some(SortMode::Recent));
        assert_eq!(SortMode::parse("Top"), Some(SortMode::Top));
        assert_eq!(SortMode::parse("latest"), Some(SortMode::Recent));
        assert_eq!(SortMode::parse("oldest"), None);
    }
}
