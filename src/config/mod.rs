//! Configuration module for capture-replay
//!
//! [`PlaybackConfig`] holds the knobs of the playback engine: pacing mode,
//! which sensors to deliver, and the sizes of the indexing and read-ahead
//! windows. It is plain serde data, persisted as TOML.
//!
//! # Location
//!
//! The default configuration file lives in the platform configuration
//! directory:
//! - **Linux**: `~/.config/capture-replay/playback.toml`
//! - **macOS**: `~/Library/Application Support/capture-replay/playback.toml`
//! - **Windows**: `%APPDATA%\capture-replay\playback.toml`
//!
//! # Example
//!
//! ```ignore
//! use capture_replay::config::PlaybackConfig;
//!
//! let mut config = PlaybackConfig::load_or_default();
//! config.realtime = false;
//! config.save("playback.toml")?;
//! ```

use crate::error::{ReplayError, Result};
use crate::types::StreamId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for the configuration directory
pub const APP_ID: &str = "capture-replay";

/// Configuration filename
pub const CONFIG_FILE: &str = "playback.toml";

/// Default number of records parsed per indexing batch
pub const DEFAULT_INDEX_BATCH_SIZE: usize = 30;

/// Default queue depth that counts as buffered when only motion is flowing
pub const DEFAULT_MOTION_PREFETCH_DEPTH: usize = 5;

/// Default hard cap on queued samples
pub const DEFAULT_MAX_PREFETCH_DEPTH: usize = 64;

/// Default longest single sleep of the realtime wait, in milliseconds
pub const DEFAULT_MAX_SLEEP_INCREMENT_MS: u64 = 10;

/// Path of the default configuration file
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

/// Playback engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Pace delivery to the recorded timestamps
    pub realtime: bool,
    /// Deliver motion and time-sync samples
    pub motion_enabled: bool,
    /// Records parsed per indexing batch
    pub index_batch_size: usize,
    /// With no image stream active, motion counts as buffered above this depth
    pub motion_prefetch_depth: usize,
    /// Queue depth at which read-ahead stops regardless of stream readiness
    pub max_prefetch_depth: usize,
    /// Longest single sleep while waiting for a sample to become due
    pub max_sleep_increment_ms: u64,
    /// Streams enabled at initialization
    pub streams: Vec<StreamId>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            realtime: true,
            motion_enabled: false,
            index_batch_size: DEFAULT_INDEX_BATCH_SIZE,
            motion_prefetch_depth: DEFAULT_MOTION_PREFETCH_DEPTH,
            max_prefetch_depth: DEFAULT_MAX_PREFETCH_DEPTH,
            max_sleep_increment_ms: DEFAULT_MAX_SLEEP_INCREMENT_MS,
            streams: Vec::new(),
        }
    }
}

impl PlaybackConfig {
    pub fn max_sleep_increment(&self) -> Duration {
        Duration::from_millis(self.max_sleep_increment_ms.max(1))
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.index_batch_size == 0 {
            return Err(ReplayError::Config(
                "index_batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_prefetch_depth == 0 {
            return Err(ReplayError::Config(
                "max_prefetch_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReplayError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            ReplayError::Config(format!("Failed to parse config {:?}: {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, falling back to defaults
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load playback config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ReplayError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ReplayError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ReplayError::Config(format!("Failed to write config: {}", e)))?;

        tracing::debug!("Saved playback config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = PlaybackConfig::default();
        assert!(config.realtime);
        assert!(!config.motion_enabled);
        assert_eq!(config.index_batch_size, 30);
        assert_eq!(config.max_sleep_increment(), Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let config = PlaybackConfig {
            realtime: false,
            motion_enabled: true,
            streams: vec![StreamId::Depth, StreamId::Infrared2],
            ..Default::default()
        };
        config.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("infrared2"));

        let loaded = PlaybackConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "realtime = false\nstreams = [\"color\"]\n").unwrap();

        let loaded = PlaybackConfig::load(&path).unwrap();
        assert!(!loaded.realtime);
        assert_eq!(loaded.streams, vec![StreamId::Color]);
        assert_eq!(loaded.max_prefetch_depth, DEFAULT_MAX_PREFETCH_DEPTH);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "index_batch_size = 0\n").unwrap();
        assert!(matches!(
            PlaybackConfig::load(&path),
            Err(ReplayError::Config(_))
        ));

        std::fs::write(&path, "realtime = \"sometimes\"\n").unwrap();
        assert!(PlaybackConfig::load(&path).is_err());
    }
}
