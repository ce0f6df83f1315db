//! Pacing policy: delays between page loads, scrolls, and root posts.
//!
//! One mutable `PacingConfig` is shared process-wide; presets trade
//! throughput against detection risk. Every `delay` call suspends the
//! caller for the base delay plus uniform jitter.

use std::sync::{OnceLock, RwLock};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Named pacing presets, slowest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PacingPreset {
    UltraSlow,
    Slow,
    #[default]
    Normal,
    Fast,
}

impl PacingPreset {
    /// Parse a preset name; tolerates camelCase, snake_case and kebab-case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['_', '-'], "").as_str() {
            "ultraslow" => Some(Self::UltraSlow),
            "slow" => Some(Self::Slow),
            "normal" => Some(Self::Normal),
            "fast" => Some(Self::Fast),
            _ => None,
        }
    }

    pub fn config(self) -> PacingConfig {
        match self {
            Self::UltraSlow => PacingConfig {
                page_load_delay_ms: 5000,
                scroll_delay_ms: 4000,
                between_posts_delay_ms: 10000,
                random_jitter: true,
                jitter_min_ms: 2000,
                jitter_max_ms: 5000,
            },
            Self::Slow => PacingConfig {
                page_load_delay_ms: 3000,
                scroll_delay_ms: 2500,
                between_posts_delay_ms: 5000,
                random_jitter: true,
                jitter_min_ms: 1000,
                jitter_max_ms: 3000,
            },
            Self::Normal => PacingConfig {
                page_load_delay_ms: 2000,
                scroll_delay_ms: 1500,
                between_posts_delay_ms: 3000,
                random_jitter: true,
                jitter_min_ms: 500,
                jitter_max_ms: 1500,
            },
            Self::Fast => PacingConfig {
                page_load_delay_ms: 1000,
                scroll_delay_ms: 800,
                between_posts_delay_ms: 1500,
                random_jitter: true,
                jitter_min_ms: 200,
                jitter_max_ms: 800,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingConfig {
    pub page_load_delay_ms: u64,
    pub scroll_delay_ms: u64,
    pub between_posts_delay_ms: u64,
    pub random_jitter: bool,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        PacingPreset::Normal.config()
    }
}

/// Process-wide pacing policy.
pub struct PacingPolicy {
    config: RwLock<PacingConfig>,
}

impl PacingPolicy {
    pub fn new(config: PacingConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// The shared policy used by all harvests in this process.
    pub fn global() -> &'static PacingPolicy {
        static POLICY: OnceLock<PacingPolicy> = OnceLock::new();
        POLICY.get_or_init(|| PacingPolicy::new(PacingConfig::default()))
    }

    pub fn current(&self) -> PacingConfig {
        self.config
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn set(&self, config: PacingConfig) {
        if let Ok(mut guard) = self.config.write() {
            *guard = config;
        }
    }

    pub fn apply_preset(&self, preset: PacingPreset) {
        tracing::debug!("Applying pacing preset {:?}", preset);
        self.set(preset.config());
    }

    /// Base delay plus jitter, without sleeping. Exposed for tests.
    pub fn jittered(&self, base_ms: u64) -> u64 {
        let config = self.current();
        if !config.random_jitter || config.jitter_max_ms < config.jitter_min_ms {
            return base_ms;
        }
        let jitter = rand::rng().random_range(config.jitter_min_ms..=config.jitter_max_ms);
        base_ms + jitter
    }

    /// Suspend the caller for `base_ms` plus jitter.
    pub async fn delay(&self, base_ms: u64) {
        let total = self.jittered(base_ms);
        tokio::time::sleep(Duration::from_millis(total)).await;
    }

    pub async fn page_load_delay(&self) {
        let base = self.current().page_load_delay_ms;
        self.delay(base).await;
    }

    pub async fn scroll_delay(&self) {
        let base = self.current().scroll_delay_ms;
        self.delay(base).await;
    }

    pub async fn between_posts_delay(&self) {
        let base = self.current().between_posts_delay_ms;
        self.delay(base).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_table_matches_policy() {
        let ultra = PacingPreset::UltraSlow.config();
        assert_eq!(ultra.page_load_delay_ms, 5000);
        assert_eq!(ultra.scroll_delay_ms, 4000);
        assert_eq!(ultra.between_posts_delay_ms, 10000);
        assert_eq!((ultra.jitter_min_ms, ultra.jitter_max_ms), (2000, 5000));

        let fast = PacingPreset::Fast.config();
        assert_eq!(fast.page_load_delay_ms, 1000);
        assert_eq!(fast.scroll_delay_ms, 800);
        assert_eq!(fast.between_posts_delay_ms, 1500);
        assert_eq!((fast.jitter_min_ms, fast.jitter_max_ms), (200, 800));
    }

    #[test]
    fn preset_parse_tolerates_casing() {
        assert_eq!(PacingPreset::parse("ultraSlow"), Some(PacingPreset::UltraSlow));
        assert_eq!(PacingPreset::parse("ultra_slow"), Some(PacingPreset::UltraSlow));
        assert_eq!(PacingPreset::parse("ultra-slow"), Some(PacingPreset::UltraSlow));
        assert_eq!(PacingPreset::parse("FAST"), Some(PacingPreset::Fast));
        assert_eq!(PacingPreset::parse("warp"), None);
    }

    #[test]
    fn jitter_disabled_returns_base() {
        let policy = PacingPolicy::new(PacingConfig {
            random_jitter: false,
            ..PacingConfig::default()
        });
        assert_eq!(policy.jittered(1500), 1500);
    }

    #[test]
    fn jitter_stays_within_range() {
        let policy = PacingPolicy::new(PacingConfig {
            random_jitter: true,
            jitter_min_ms: 100,
            jitter_max_ms: 300,
            ..PacingConfig::default()
        });
        for _ in 0..50 {
            let total = policy.jittered(1000);
            assert!((1100..=1300).contains(&total));
        }
    }
}
