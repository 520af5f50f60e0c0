//! launchcast configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dispatch::{DispatchConfig, RateLimitConfig};
use crate::notifier::NotifierConfig;
use crate::scheduler::SchedulerConfig;

/// Main launchcast configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Slip tolerance and scan horizon
    pub scheduler: SchedulerConfig,

    /// Refresh and scan timers
    pub notifier: NotifierConfig,

    /// Queue and sender behaviour
    pub dispatch: DispatchConfig,

    /// Token bucket sizes
    #[serde(rename = "rate-limit")]
    pub rate_limit: RateLimitConfig,

    /// Database location
    pub storage: StorageConfig,

    /// Chat platform binding
    pub transport: TransportConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the bot token environment variable is set. Dry runs never
    /// reach the transport and skip this.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.transport.bot_token_env).is_err() {
            return Err(eyre::eyre!(
                "Bot token not found. Set the {} environment variable.",
                self.transport.bot_token_env
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .launchcast.yml
        let local_config = PathBuf::from(".launchcast.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/launchcast/launchcast.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("launchcast").join("launchcast.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(rename = "db-path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // XDG data directory (~/.local/share/launchcast on Linux)
        let db_path = dirs::data_dir()
            .map(|d| d.join("launchcast"))
            .unwrap_or_else(|| PathBuf::from(".launchcast"))
            .join("launchcast.db");

        Self { db_path }
    }
}

/// Chat platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Environment variable containing the bot token
    #[serde(rename = "bot-token-env")]
    pub bot_token_env: String,

    /// Bot API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// HTTP timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bot_token_env: "LAUNCHCAST_BOT_TOKEN".to_string(),
            base_url: "https://api.telegram.org".to_string(),
            timeout_ms: 15_000,
        }
    }
}

impl TransportConfig {
    /// Read the bot token from the configured environment variable
    pub fn get_bot_token(&self) -> Result<String> {
        std::env::var(&self.bot_token_env).context(format!("{} is not set", self.bot_token_env))
    }
}
