// Bridge configuration
//
// Policy knobs for a Registry, loadable from a YAML file. The off-thread
// fallback target is a policy choice, not a derivable invariant, so it is
// kept configurable rather than hard-coded.

use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::fs;

fn default_queue_warn_depth() -> usize {
    1024
}

/// Where a default-target call lands when the calling thread has no loop
/// of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTarget {
    /// Use the registry's main loop. The calling thread usually has no
    /// loop draining deferred events, so "the caller's own thread" would
    /// not be a useful target.
    #[default]
    Main,
    /// Refuse: default-target calls from unregistered threads fail with
    /// [`DispatchError::NoLoopForThread`](crate::DispatchError::NoLoopForThread).
    Strict,
}

/// Configuration for a [`Registry`](crate::Registry).
///
/// # Example
/// ```
/// use crossloop::BridgeConfig;
///
/// let config: BridgeConfig = serde_yaml_ng::from_str("fallback_target: strict\n").unwrap();
/// assert_eq!(config, BridgeConfig {
///     fallback_target: crossloop::FallbackTarget::Strict,
///     ..BridgeConfig::default()
/// });
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Target policy for default-target calls from non-loop threads.
    #[serde(default)]
    pub fallback_target: FallbackTarget,

    /// Queue depth at which a loop logs a warning that it may not be
    /// draining.
    #[serde(default = "default_queue_warn_depth")]
    pub queue_warn_depth: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            fallback_target: FallbackTarget::default(),
            queue_warn_depth: default_queue_warn_depth(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Utf8Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file_contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read bridge config: {}", path))?;

        let config: BridgeConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse bridge config: {}", path))?;

        tracing::info!("Loaded bridge config from {}", path);
        Ok(config)
    }

    /// Load configuration from a YAML file, falling back to defaults if
    /// the file does not exist.
    pub fn load_or_default<P: AsRef<Utf8Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("Bridge config not found at {}, using defaults", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Save configuration to a YAML file.
    pub fn save<P: AsRef<Utf8Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let yaml_string =
            serde_yaml_ng::to_string(self).context("Failed to serialize bridge config to YAML")?;

        fs::write(path, yaml_string)
            .with_context(|| format!("Failed to write bridge config: {}", path))?;

        tracing::info!("Saved bridge config to {}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.fallback_target, FallbackTarget::Main);
        assert_eq!(config.queue_warn_depth, 1024);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config: BridgeConfig = serde_yaml_ng::from_str("{}").unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_parse_strict_fallback() {
        let config: BridgeConfig =
            serde_yaml_ng::from_str("fallback_target: strict\nqueue_warn_depth: 16\n").unwrap();
        assert_eq!(config.fallback_target, FallbackTarget::Strict);
        assert_eq!(config.queue_warn_depth, 16);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = BridgeConfig {
            fallback_target: FallbackTarget::Strict,
            queue_warn_depth: 64,
        };
        let yaml = serde_yaml_ng::to_string(&config).unwrap();
        let parsed: BridgeConfig = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
