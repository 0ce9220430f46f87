//! Hub Configuration
//!
//! Configuration structures for the registry, health monitor, metrics
//! recorder, delegation orchestrator and discovery cache. Loaded from TOML;
//! every duration is written in seconds (fractions allowed).

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HubError, Result};

/// Default location of the hub configuration file
pub const DEFAULT_CONFIG_PATH: &str = ".subagent-hub/config.toml";

/// Top-level hub configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Registration table settings
    pub registry: RegistryConfig,

    /// Health monitor settings
    pub health: HealthConfig,

    /// Rolling metrics settings
    pub metrics: MetricsConfig,

    /// Delegation settings
    pub delegation: DelegationConfig,

    /// Discovery cache settings
    pub discovery: DiscoveryConfig,
}

/// Registration table configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Load (0-100) above which an executor is considered busy and is not routed to
    pub max_load_threshold: f64,

    /// Health check interval assigned to new registrations
    #[serde(with = "duration_secs")]
    pub default_health_check_interval: Duration,

    /// In-flight ceiling for executors that declare none
    pub default_max_concurrent_tasks: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_load_threshold: 80.0,
            default_health_check_interval: Duration::from_secs(30),
            default_max_concurrent_tasks: 1,
        }
    }
}

/// Health monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Scheduler tick
    #[serde(with = "duration_secs")]
    pub tick_interval: Duration,

    /// Probes running longer than this count as unhealthy
    #[serde(with = "duration_secs")]
    pub probe_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Rolling metrics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Weight of the newest sample in the exponential smoothing (0 < w <= 1)
    pub smoothing_factor: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.1,
        }
    }
}

/// Delegation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationConfig {
    /// Preempt executions that exceed the request timeout
    pub enforce_timeouts: bool,

    /// Timeout given to requests built with `SubagentHub::request`
    #[serde(with = "duration_secs")]
    pub default_timeout: Duration,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            enforce_timeouts: true,
            default_timeout: Duration::from_secs(300),
        }
    }
}

/// Discovery cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Fraction of a source's refresh interval during which its entry is fresh
    pub freshness_ratio: f64,

    /// Refresh interval for sources that do not set their own
    #[serde(with = "duration_secs")]
    pub default_refresh_interval: Duration,

    /// Providers running longer than this count as failed
    #[serde(with = "duration_secs")]
    pub provider_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            freshness_ratio: 0.8,
            default_refresh_interval: Duration::from_secs(300),
            provider_timeout: Duration::from_secs(30),
        }
    }
}

impl HubConfig {
    /// Load configuration from the default path, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = PathBuf::from(DEFAULT_CONFIG_PATH);
        if path.exists() {
            return Self::load_from_path(&path);
        }

        Ok(Self::default())
    }

    /// Load and validate configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config = Self::from_toml(&content).map_err(|e| match e {
            HubError::Config(message) => HubError::Config(format!("{}: {}", path.display(), message)),
            other => other,
        })?;

        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| HubError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| HubError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.registry.max_load_threshold) {
            return Err(HubError::Config(
                "registry.max_load_threshold must be between 0 and 100".to_string(),
            ));
        }

        if self.registry.default_max_concurrent_tasks == 0 {
            return Err(HubError::Config(
                "registry.default_max_concurrent_tasks must be > 0".to_string(),
            ));
        }

        if self.registry.default_health_check_interval.is_zero()
            || self.health.tick_interval.is_zero()
        {
            return Err(HubError::Config(
                "health check intervals must be > 0".to_string(),
            ));
        }

        if self.health.probe_timeout.is_zero() {
            return Err(HubError::Config(
                "health.probe_timeout must be > 0".to_string(),
            ));
        }

        let w = self.metrics.smoothing_factor;
        if !(w > 0.0 && w <= 1.0) {
            return Err(HubError::Config(
                "metrics.smoothing_factor must be in (0, 1]".to_string(),
            ));
        }

        let ratio = self.discovery.freshness_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(HubError::Config(
                "discovery.freshness_ratio must be in (0, 1]".to_string(),
            ));
        }

        if self.discovery.default_refresh_interval.is_zero() {
            return Err(HubError::Config(
                "discovery.default_refresh_interval must be > 0".to_string(),
            ));
        }

        if self.discovery.provider_timeout.is_zero() {
            return Err(HubError::Config(
                "discovery.provider_timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Serde adapter writing a `Duration` as (fractional) seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HubConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.registry.max_load_threshold, 80.0);
        assert_eq!(config.health.tick_interval, Duration::from_secs(10));
        assert_eq!(config.metrics.smoothing_factor, 0.1);
        assert_eq!(config.discovery.freshness_ratio, 0.8);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = HubConfig::from_toml(
            r#"
            [health]
            tick_interval = 2.5

            [delegation]
            enforce_timeouts = false
            "#,
        )
        .unwrap();

        assert_eq!(config.health.tick_interval, Duration::from_millis(2500));
        assert_eq!(config.health.probe_timeout, Duration::from_secs(5));
        assert!(!config.delegation.enforce_timeouts);
        assert_eq!(config.registry, RegistryConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = HubConfig::from_toml("[metrics]\nsmoothing_factor = 1.5\n");
        assert!(matches!(result, Err(HubError::Config(_))));

        let result = HubConfig::from_toml("[registry]\nmax_load_threshold = 120.0\n");
        assert!(matches!(result, Err(HubError::Config(_))));
    }

    #[test]
    fn test_toml_roundtrip_and_file_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = HubConfig::default();
        config.registry.default_max_concurrent_tasks = 4;
        fs::write(&path, config.to_toml().unwrap()).unwrap();

        let loaded = HubConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let result = HubConfig::from_toml("[health]\nprobe_timeout = 0\n");
        assert!(matches!(result, Err(HubError::Config(ref m)) if m.contains("probe_timeout")));

        let result = HubConfig::from_toml("[discovery]\nprovider_timeout = 0.0\n");
        assert!(matches!(result, Err(HubError::Config(_))));
    }

    #[test]
    fn test_file_errors_name_the_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        fs::write(&path, "[metrics]\nsmoothing_factor = 2.0\n").unwrap();

        let message = HubConfig::load_from_path(&path).unwrap_err().to_string();

        assert!(message.contains("hub.toml"));
        assert!(message.contains("smoothing_factor"));
        assert_eq!(message.matches("Configuration error").count(), 1);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = HubConfig::load_from_path(Path::new("/nonexistent/hub.toml"));
        assert!(result.is_err());
    }
}
