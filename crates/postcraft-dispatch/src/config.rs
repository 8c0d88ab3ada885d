//! # Dispatcher Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     POSTCRAFT_LINKEDIN_API_URL=http://localhost:9000                   │
//! │     POSTCRAFT_PUBLISH_TIMEOUT_SECS=15                                  │
//! │     POSTCRAFT_MAX_ATTEMPTS=3                                           │
//! │     POSTCRAFT_DISPATCH_BATCH_SIZE=50                                   │
//! │     POSTCRAFT_CLAIM_LEASE_SECS=300                                     │
//! │     POSTCRAFT_POST_VISIBILITY=public                                   │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     explicit path, else $POSTCRAFT_DISPATCH_CONFIG, else               │
//! │     ~/.config/postcraft/dispatch.toml (Linux)                          │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # dispatch.toml
//! [linkedin]
//! api_url = "https://api.linkedin.com"
//! timeout_secs = 15
//! visibility = "public"
//!
//! [dispatch]
//! max_attempts = 3
//! batch_size = 50
//! claim_lease_secs = 300
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DispatchError, DispatchResult};
use crate::publisher::PostVisibility;
use postcraft_core::MAX_DISPATCH_ATTEMPTS;

/// Env var naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "POSTCRAFT_DISPATCH_CONFIG";

/// Longest accepted claim lease (one day).
const MAX_CLAIM_LEASE_SECS: u64 = 86_400;

// =============================================================================
// LinkedIn Settings
// =============================================================================

/// Where and how posts are published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedInSettings {
    /// Base URL of the LinkedIn REST API (no trailing slash needed).
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Upper bound for one publish call, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Audience for published posts.
    #[serde(default)]
    pub visibility: PostVisibility,
}

fn default_api_url() -> String {
    "https://api.linkedin.com".to_string()
}

fn default_timeout() -> u64 {
    15
}

impl Default for LinkedInSettings {
    fn default() -> Self {
        LinkedInSettings {
            api_url: default_api_url(),
            timeout_secs: default_timeout(),
            visibility: PostVisibility::default(),
        }
    }
}

// =============================================================================
// Dispatch Settings
// =============================================================================

/// Cycle behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Delivery attempts before a post is given up on.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    /// Most posts handled in one cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// How long an in-flight claim may live before it is considered
    /// abandoned (seconds). Must exceed the publish timeout.
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: u64,
}

fn default_max_attempts() -> i64 {
    MAX_DISPATCH_ATTEMPTS
}

fn default_batch_size() -> u32 {
    50
}

fn default_claim_lease() -> u64 {
    300
}

impl Default for DispatchSettings {
    fn default() -> Self {
        DispatchSettings {
            max_attempts: default_max_attempts(),
            batch_size: default_batch_size(),
            claim_lease_secs: default_claim_lease(),
        }
    }
}

// =============================================================================
// Main Dispatcher Configuration
// =============================================================================

/// Complete dispatcher configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default)]
    pub linkedin: LinkedInSettings,

    #[serde(default)]
    pub dispatch: DispatchSettings,
}

impl DispatcherConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (dispatch.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DispatchResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading dispatcher config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load dispatcher config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document. Missing keys fall back to defaults.
    pub fn from_toml(contents: &str) -> DispatchResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> DispatchResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| DispatchError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DispatchError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| DispatchError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Dispatcher config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DispatchResult<()> {
        let url = &self.linkedin.api_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(DispatchError::InvalidConfig(format!(
                "LinkedIn API URL must start with http:// or https://, got: {}",
                url
            )));
        }

        if self.linkedin.timeout_secs == 0 {
            return Err(DispatchError::InvalidConfig(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.dispatch.max_attempts < 1 {
            return Err(DispatchError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }

        if self.dispatch.batch_size == 0 {
            return Err(DispatchError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }

        if self.dispatch.claim_lease_secs > MAX_CLAIM_LEASE_SECS {
            return Err(DispatchError::InvalidConfig(format!(
                "claim_lease_secs must be at most {}",
                MAX_CLAIM_LEASE_SECS
            )));
        }

        if self.dispatch.claim_lease_secs <= self.linkedin.timeout_secs {
            return Err(DispatchError::InvalidConfig(format!(
                "claim_lease_secs ({}) must exceed timeout_secs ({})",
                self.dispatch.claim_lease_secs, self.linkedin.timeout_secs
            )));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("POSTCRAFT_LINKEDIN_API_URL") {
            debug!(url = %url, "Overriding LinkedIn API URL from environment");
            self.linkedin.api_url = url;
        }

        if let Ok(secs) = std::env::var("POSTCRAFT_PUBLISH_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.linkedin.timeout_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid POSTCRAFT_PUBLISH_TIMEOUT_SECS"),
            }
        }

        if let Ok(max) = std::env::var("POSTCRAFT_MAX_ATTEMPTS") {
            match max.parse::<i64>() {
                Ok(m) => self.dispatch.max_attempts = m,
                Err(_) => warn!(value = %max, "Ignoring invalid POSTCRAFT_MAX_ATTEMPTS"),
            }
        }

        if let Ok(size) = std::env::var("POSTCRAFT_DISPATCH_BATCH_SIZE") {
            if let Ok(s) = size.parse::<u32>() {
                self.dispatch.batch_size = s;
            }
        }

        if let Ok(lease) = std::env::var("POSTCRAFT_CLAIM_LEASE_SECS") {
            if let Ok(l) = lease.parse::<u64>() {
                self.dispatch.claim_lease_secs = l;
            }
        }

        if let Ok(visibility) = std::env::var("POSTCRAFT_POST_VISIBILITY") {
            match visibility.parse() {
                Ok(v) => self.linkedin.visibility = v,
                Err(_) => warn!(visibility = %visibility, "Unknown post visibility in environment"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }
        directories::ProjectDirs::from("com", "postcraft", "postcraft")
            .map(|dirs| dirs.config_dir().join("dispatch.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.linkedin.timeout_secs)
    }

    pub fn claim_lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.dispatch.claim_lease_secs.min(MAX_CLAIM_LEASE_SECS) as i64)
    }
}
