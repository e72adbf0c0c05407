//! Configuration for the tensor smoother.

use crate::core::TrackerConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration, stored as JSON.
///
/// Field aliases accept configuration files written for the earlier
/// MQTT-based module (`big_packet`, `default_phase_duration`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prefix for individual delta payloads (`{name}_{key}={value}`)
    pub name: String,

    /// Event bus host
    pub host: String,

    /// Client name presented to the event bus
    #[serde(alias = "mqtt_client_name")]
    pub client_name: String,

    /// Destination topic for every notification
    pub topic: String,

    /// Connection keepalive for the transport
    #[serde(with = "duration_serde")]
    pub keepalive: Duration,

    /// Publish the full snapshot on any change instead of one message per key
    #[serde(alias = "big_packet")]
    pub combine_notifications: bool,

    /// Window capacity for keys without an override
    #[serde(alias = "default_phase_duration")]
    pub default_window_capacity: i64,

    /// Per-key window capacities
    #[serde(alias = "custom_phase_duration")]
    pub window_overrides: BTreeMap<String, i64>,

    /// Tracked keys, in reporting order
    #[serde(alias = "tensor_keys")]
    pub keys: Vec<String>,

    /// Path for storing session statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tensor-smoother");

        let mut window_overrides = BTreeMap::new();
        window_overrides.insert("example_tensor".to_string(), 500);

        Self {
            name: "default".to_string(),
            host: "public.mqtthq.com".to_string(),
            client_name: "DEFAULT".to_string(),
            topic: "testml/".to_string(),
            keepalive: Duration::from_secs(60),
            combine_notifications: false,
            default_window_capacity: 999,
            window_overrides,
            keys: vec!["example_tensor".to_string()],
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults when absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from `path`, writing the defaults there first if
    /// the file does not exist yet.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load_from(path);
        }

        let config = Self::default();
        config.save_to(path)?;
        tracing::info!(path = %path.display(), "wrote default configuration");
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tensor-smoother")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Path of the persisted session statistics.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }

    /// Validate the smoothing settings and build the tracker configuration.
    ///
    /// Overrides for keys that are not tracked are ignored.
    pub fn tracker_config(&self) -> Result<TrackerConfig, ConfigError> {
        let default_capacity = positive_capacity("default", self.default_window_capacity)?;

        let mut capacity_overrides = HashMap::new();
        for (key, &capacity) in &self.window_overrides {
            let capacity = positive_capacity(key, capacity)?;
            if !self.keys.contains(key) {
                tracing::warn!(key = %key, "window override for an untracked key, ignoring");
                continue;
            }
            capacity_overrides.insert(key.clone(), capacity);
        }

        Ok(TrackerConfig {
            keys: self.keys.clone(),
            default_capacity,
            capacity_overrides,
            combine_notifications: self.combine_notifications,
        })
    }
}

fn positive_capacity(scope: &str, capacity: i64) -> Result<usize, ConfigError> {
    usize::try_from(capacity)
        .ok()
        .filter(|c| *c > 0)
        .ok_or_else(|| ConfigError::InvalidCapacity {
            scope: scope.to_string(),
            capacity,
        })
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
    #[error("window capacity for {scope} must be positive, got {capacity}")]
    InvalidCapacity { scope: String, capacity: i64 },
    #[error("no keys configured")]
    EmptyKeys,
    #[error("key '{0}' is configured more than once")]
    DuplicateKey(String),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.keepalive, Duration::from_secs(60));
        assert_eq!(config.default_window_capacity, 999);
        assert!(!config.combine_notifications);
        assert_eq!(config.window_overrides.get("example_tensor"), Some(&500));
    }

    #[test]
    fn test_legacy_field_names() {
        let json = r#"{
            "name": "cam1",
            "host": "broker.local",
            "mqtt_client_name": "CAM",
            "topic": "ml/",
            "keepalive": 30,
            "big_packet": true,
            "default_phase_duration": 20,
            "custom_phase_duration": {"person": 10},
            "tensor_keys": ["person", "dog"]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.client_name, "CAM");
        assert_eq!(config.keepalive, Duration::from_secs(30));
        assert!(config.combine_notifications);

        let tracker = config.tracker_config().unwrap();
        assert_eq!(tracker.keys, vec!["person".to_string(), "dog".to_string()]);
        assert_eq!(tracker.default_capacity, 20);
        assert_eq!(tracker.capacity_overrides.get("person"), Some(&10));
        assert!(tracker.combine_notifications);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config = serde_json::from_str(r#"{"keys": ["cup"]}"#).unwrap();
        assert_eq!(config.topic, "testml/");
        assert_eq!(config.keys, vec!["cup".to_string()]);
    }

    #[test]
    fn test_non_positive_capacity_rejected() {
        let mut config = Config::default();
        config.default_window_capacity = 0;
        assert!(matches!(
            config.tracker_config(),
            Err(ConfigError::InvalidCapacity { capacity: 0, .. })
        ));

        let mut config = Config::default();
        config.window_overrides.insert("example_tensor".to_string(), -4);
        assert_eq!(
            config.tracker_config(),
            Err(ConfigError::InvalidCapacity {
                scope: "example_tensor".to_string(),
                capacity: -4,
            })
        );
    }

    #[test]
    fn test_override_for_untracked_key_ignored() {
        let mut config = Config::default();
        config.window_overrides.insert("ghost".to_string(), 3);

        let tracker = config.tracker_config().unwrap();
        assert!(!tracker.capacity_overrides.contains_key("ghost"));
        assert_eq!(tracker.capacity_overrides.get("example_tensor"), Some(&500));
    }

    #[test]
    fn test_load_or_init_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.name, "default");

        let mut changed = config.clone();
        changed.topic = "other/".to_string();
        changed.save_to(&path).unwrap();

        let reloaded = Config::load_or_init(&path).unwrap();
        assert_eq!(reloaded.topic, "other/");
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
