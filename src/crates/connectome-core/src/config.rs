//! Space configuration (§6, §4.9): the keys the core recognizes, mirrored
//! as a serde-derived struct the same way the teacher stack layers its own
//! compiled-graph configuration — a `Default` impl, TOML deserialization,
//! and field-by-field override via [`SpaceConfigBuilder`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub storage_path: PathBuf,
    pub snapshot_interval: u64,
    pub bucket_size: u64,
    pub bucket_cache_size: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage_path: PathBuf::from("storage"),
            snapshot_interval: 100,
            bucket_size: 100,
            bucket_cache_size: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompressionConfig {
    pub trigger_threshold: u32,
    pub min_frames_before_compression: u64,
    pub max_pending_ranges: usize,
    pub max_concurrent: usize,
    pub retry_limit: u32,
    pub retry_delay_ms: u64,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: 6_000,
            min_frames_before_compression: 4,
            max_pending_ranges: 8,
            max_concurrent: 2,
            retry_limit: 2,
            retry_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub phase3_soft_deadline_ms: u64,
    pub transform_fixed_point_limit: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { phase3_soft_deadline_ms: 5_000, transform_fixed_point_limit: 4 }
    }
}

/// Top-level configuration recognized by the core (§6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SpaceConfig {
    pub persistence: PersistenceConfig,
    pub compression: CompressionConfig,
    pub scheduler: SchedulerConfig,
    /// `true` starts from empty state; `false` restores from persistence.
    pub reset: bool,
}

impl SpaceConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn builder() -> SpaceConfigBuilder {
        SpaceConfigBuilder::default()
    }
}

/// Field-by-field override builder, starting from [`SpaceConfig::default`].
#[derive(Debug, Clone, Default)]
pub struct SpaceConfigBuilder {
    config: SpaceConfig,
}

impl SpaceConfigBuilder {
    pub fn persistence_enabled(mut self, enabled: bool) -> Self {
        self.config.persistence.enabled = enabled;
        self
    }

    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.persistence.storage_path = path.into();
        self
    }

    pub fn snapshot_interval(mut self, frames: u64) -> Self {
        self.config.persistence.snapshot_interval = frames;
        self
    }

    pub fn bucket_size(mut self, size: u64) -> Self {
        self.config.persistence.bucket_size = size;
        self
    }

    pub fn compression_trigger_threshold(mut self, tokens: u32) -> Self {
        self.config.compression.trigger_threshold = tokens;
        self
    }

    pub fn phase3_soft_deadline_ms(mut self, ms: u64) -> Self {
        self.config.scheduler.phase3_soft_deadline_ms = ms;
        self
    }

    pub fn transform_fixed_point_limit(mut self, limit: u32) -> Self {
        self.config.scheduler.transform_fixed_point_limit = limit;
        self
    }

    pub fn reset(mut self, reset: bool) -> Self {
        self.config.reset = reset;
        self
    }

    pub fn build(self) -> SpaceConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = SpaceConfig::default();
        assert_eq!(config.persistence.snapshot_interval, 100);
        assert_eq!(config.persistence.bucket_size, 100);
        assert_eq!(config.compression.retry_limit, 2);
        assert_eq!(config.compression.retry_delay_ms, 200);
        assert_eq!(config.scheduler.phase3_soft_deadline_ms, 5_000);
        assert_eq!(config.scheduler.transform_fixed_point_limit, 4);
    }

    #[test]
    fn builder_overrides_only_named_fields() {
        let config = SpaceConfig::builder().snapshot_interval(50).reset(true).build();
        assert_eq!(config.persistence.snapshot_interval, 50);
        assert!(config.reset);
        assert_eq!(config.persistence.bucket_size, 100);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config = SpaceConfig::from_toml_str("reset = true\n[compression]\nretry_limit = 5\n").unwrap();
        assert!(config.reset);
        assert_eq!(config.compression.retry_limit, 5);
        assert_eq!(config.compression.retry_delay_ms, 200);
    }
}
