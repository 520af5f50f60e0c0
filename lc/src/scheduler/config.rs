//! Scheduler configuration

use serde::{Deserialize, Serialize};

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SchedulerConfig {
    /// How late a notification may be and still be sent
    #[serde(default = "default_slip_tolerance_secs")]
    pub slip_tolerance_secs: i64,

    /// Delay applied to a slightly late notification
    #[serde(default = "default_reschedule_delay_secs")]
    pub reschedule_delay_secs: i64,

    /// Notifications further out than this are not reported
    #[serde(default = "default_horizon_secs")]
    pub horizon_secs: i64,
}

fn default_slip_tolerance_secs() -> i64 {
    5 * 60
}

fn default_reschedule_delay_secs() -> i64 {
    10
}

fn default_horizon_secs() -> i64 {
    14 * 24 * 3600
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            slip_tolerance_secs: default_slip_tolerance_secs(),
            reschedule_delay_secs: default_reschedule_delay_secs(),
            horizon_secs: default_horizon_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.slip_tolerance_secs, 300);
        assert_eq!(config.reschedule_delay_secs, 10);
        assert_eq!(config.horizon_secs, 1_209_600);
    }

    #[test]
    fn test_empty_yaml_matches_default() {
        let config: SchedulerConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: SchedulerConfig = serde_yaml::from_str("slip-tolerance-secs: 60").unwrap();
        assert_eq!(config.slip_tolerance_secs, 60);
        assert_eq!(config.reschedule_delay_secs, 10);
    }
}
