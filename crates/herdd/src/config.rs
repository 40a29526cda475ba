//! Configuration management for herdd.
//!
//! Loads settings from /etc/herdd/config.toml or uses defaults.

use crate::identify::ConfidencePolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/herdd/config.toml";

/// Default config file path for fallback
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/herdd/config.toml";

/// Transport (Bot API) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Bot token issued by the transport. Required; there is no default.
    #[serde(default)]
    pub bot_token: String,

    /// Bot API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Long-poll window in seconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Timeout for ordinary API requests in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_api_base(),
            poll_timeout_secs: default_poll_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Inference service configuration (species classifier + identifier)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Base URL of the inference service hosting both models
    #[serde(default = "default_vision_endpoint")]
    pub endpoint: String,

    /// Per-call timeout in seconds; expiry is reported as a retryable outage
    #[serde(default = "default_vision_timeout")]
    pub timeout_secs: u64,

    /// How many of the classifier's ranked labels the species gate inspects
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Labels the gate accepts as the target species
    #[serde(default = "default_target_labels")]
    pub target_labels: Vec<String>,
}

fn default_vision_endpoint() -> String {
    "http://127.0.0.1:8093".to_string()
}

fn default_vision_timeout() -> u64 {
    8
}

fn default_top_k() -> usize {
    3
}

fn default_target_labels() -> Vec<String> {
    vec!["cow".to_string(), "ox".to_string()]
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_vision_endpoint(),
            timeout_secs: default_vision_timeout(),
            top_k: default_top_k(),
            target_labels: default_target_labels(),
        }
    }
}

/// Identification confidence policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Scores below this are not considered a confident match
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// gate: below-threshold results become "no match, enroll?"
    /// annotate: the match is always reported, with a caveat below threshold
    #[serde(default)]
    pub policy: ConfidencePolicy,
}

fn default_confidence_threshold() -> f32 {
    0.6
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            policy: ConfidencePolicy::default(),
        }
    }
}

/// Registry storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding users.json, animals.json and missing.json
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/herdd")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Missing-alert fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Maximum concurrent deliveries
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Per-recipient delivery timeout in seconds
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_secs: u64,
}

fn default_max_in_flight() -> usize {
    8
}

fn default_delivery_timeout() -> u64 {
    10
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            delivery_timeout_secs: default_delivery_timeout(),
        }
    }
}

/// Conversation session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions idle longer than this are evicted back to the idle state
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,

    /// How often the eviction sweep runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_idle_ttl() -> u64 {
    86_400
}

fn default_sweep_interval() -> u64 {
    600
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_idle_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub vision: VisionConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Load config from file, or return defaults
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_PATH)
            .or_else(|_| Self::load_from_path(DEFAULT_CONFIG_PATH))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                Config::default()
            })
    }

    /// Load config from specific path
    pub fn load_from_path(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded config from {}", path);
        Ok(config)
    }

    /// Save default config to path (for herdctl config-init)
    pub fn save_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)?;
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        info!("Saved default config to {}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.vision.top_k, 3);
        assert_eq!(config.vision.target_labels, vec!["cow", "ox"]);
        assert_eq!(config.identity.policy, ConfidencePolicy::Gate);
        assert!(config.transport.bot_token.is_empty());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[transport]
bot_token = "1234:abcd"

[vision]
top_k = 5
target_labels = ["cow", "ox", "water_buffalo"]

[identity]
confidence_threshold = 0.8
policy = "annotate"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.transport.bot_token, "1234:abcd");
        assert_eq!(config.vision.top_k, 5);
        assert_eq!(config.vision.target_labels.len(), 3);
        assert_eq!(config.identity.confidence_threshold, 0.8);
        assert_eq!(config.identity.policy, ConfidencePolicy::Annotate);
        // Defaults for missing fields
        assert_eq!(config.transport.poll_timeout_secs, 30);
        assert_eq!(config.broadcast.max_in_flight, 8);
    }

    #[test]
    fn test_partial_section_falls_back_to_field_defaults() {
        let toml_str = r#"
[storage]
data_dir = "/tmp/herdd-test"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/herdd-test"));
        assert_eq!(config.identity.confidence_threshold, 0.6);
    }

    #[test]
    fn test_save_default_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        Config::save_default(path.to_str().unwrap()).unwrap();
        let loaded = Config::load_from_path(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.vision.top_k, 3);
    }
}
