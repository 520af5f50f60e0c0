//! Notifier configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timer configuration for the watchers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NotifierConfig {
    /// Seconds between upstream refreshes
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Longest sleep before the next-due scan runs again
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    30
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl NotifierConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NotifierConfig::default();
        assert_eq!(config.refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_empty_yaml_matches_default() {
        let config: NotifierConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, NotifierConfig::default());
    }

    #[test]
    fn test_zero_intervals_clamped() {
        let config = NotifierConfig {
            refresh_interval_secs: 0,
            poll_interval_secs: 0,
        };
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }
}
