//! Monitor configuration.
//!
//! Every field has a default, so a config file only needs to name what it
//! overrides:
//!
//! ```toml
//! [tip]
//! show_threshold = 4
//!
//! [area_cache]
//! ttl_secs = 600
//! ```

use crate::error::{MonitorError, MonitorResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// When to surface a self-care tip to an entry's author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TipPolicy {
    /// Number of recent entries read for the streak.
    pub window_days: usize,
    /// Minimum streak length that shows a tip.
    pub show_threshold: u32,
    /// Streak length from which the high tier code is used.
    pub high_tier_threshold: u32,
}

impl Default for TipPolicy {
    fn default() -> Self {
        Self {
            window_days: 7,
            show_threshold: 3,
            high_tier_threshold: 5,
        }
    }
}

/// When a streak alone is enough to flag a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    /// Number of recent entries read for the streak.
    pub window_days: usize,
    /// Minimum streak length that escalates on its own.
    pub streak_threshold: u32,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            window_days: 7,
            streak_threshold: 7,
        }
    }
}

/// Emotion-to-area cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaCacheConfig {
    pub ttl_secs: u64,
}

impl AreaCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for AreaCacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

/// Configuration for the monitoring engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub tip: TipPolicy,
    pub risk: RiskPolicy,
    pub area_cache: AreaCacheConfig,
}

impl MonitorConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> MonitorResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| MonitorError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(contents: &str) -> MonitorResult<Self> {
        let config: MonitorConfig =
            toml::from_str(contents).map_err(|e| MonitorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MonitorResult<()> {
        if self.tip.window_days == 0 || self.risk.window_days == 0 {
            return Err(MonitorError::Config(
                "window_days must be at least 1".to_string(),
            ));
        }
        if self.tip.show_threshold == 0 || self.risk.streak_threshold == 0 {
            return Err(MonitorError::Config(
                "streak thresholds must be at least 1".to_string(),
            ));
        }
        if (self.risk.window_days as u64) < u64::from(self.risk.streak_threshold) {
            return Err(MonitorError::Config(format!(
                "risk.window_days ({}) cannot hold a streak of {}",
                self.risk.window_days, self.risk.streak_threshold
            )));
        }
        if (self.tip.window_days as u64) < u64::from(self.tip.show_threshold) {
            return Err(MonitorError::Config(format!(
                "tip.window_days ({}) cannot hold a streak of {}",
                self.tip.window_days, self.tip.show_threshold
            )));
        }
        if (self.tip.window_days as u64) < u64::from(self.tip.high_tier_threshold) {
            return Err(MonitorError::Config(format!(
                "tip.high_tier_threshold ({}) is beyond tip.window_days ({})",
                self.tip.high_tier_threshold, self.tip.window_days
            )));
        }
        if self.tip.high_tier_threshold < self.tip.show_threshold {
            return Err(MonitorError::Config(format!(
                "tip.high_tier_threshold ({}) is below tip.show_threshold ({})",
                self.tip.high_tier_threshold, self.tip.show_threshold
            )));
        }
        Ok(())
    }
}
