//! Dispatch configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Queue and sender configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DispatchConfig {
    /// Tokens charged per recipient for ordinary payloads
    #[serde(default = "default_base_token_cost")]
    pub base_token_cost: u32,

    /// Payloads at least this many bytes use `large_payload_cost`
    #[serde(default = "default_large_payload_bytes")]
    pub large_payload_bytes: usize,

    #[serde(default = "default_large_payload_cost")]
    pub large_payload_cost: u32,

    /// Ceiling for the adaptive rate-limit penalty
    #[serde(default = "default_max_token_cost")]
    pub max_token_cost: u32,

    /// Recipients between priority-lane checks in a batch
    #[serde(default = "default_preempt_interval")]
    pub preempt_interval: usize,

    /// Sleep when both lanes are empty
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,

    /// Upper bound on a single transport call
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Chat that receives operational alerts
    #[serde(default)]
    pub admin_recipient: Option<String>,
}

fn default_base_token_cost() -> u32 {
    1
}

fn default_large_payload_bytes() -> usize {
    512
}

fn default_large_payload_cost() -> u32 {
    6
}

fn default_max_token_cost() -> u32 {
    30
}

fn default_preempt_interval() -> usize {
    10
}

fn default_idle_interval_ms() -> u64 {
    50
}

fn default_send_timeout_ms() -> u64 {
    10_000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            base_token_cost: default_base_token_cost(),
            large_payload_bytes: default_large_payload_bytes(),
            large_payload_cost: default_large_payload_cost(),
            max_token_cost: default_max_token_cost(),
            preempt_interval: default_preempt_interval(),
            idle_interval_ms: default_idle_interval_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            admin_recipient: None,
        }
    }
}

impl DispatchConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Token cost for a payload of `bytes` length
    pub fn token_cost(&self, bytes: usize) -> u32 {
        if bytes >= self.large_payload_bytes {
            self.large_payload_cost
        } else {
            self.base_token_cost
        }
    }
}

/// Token bucket sizes
///
/// A refill rate of zero disables that bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RateLimitConfig {
    #[serde(default = "default_global_capacity")]
    pub global_capacity: f64,

    /// Tokens per second
    #[serde(default = "default_global_refill_per_sec")]
    pub global_refill_per_sec: f64,

    #[serde(default = "default_recipient_capacity")]
    pub recipient_capacity: f64,

    #[serde(default = "default_recipient_refill_per_sec")]
    pub recipient_refill_per_sec: f64,

    /// Full per-recipient buckets idle this long are dropped
    #[serde(default = "default_recipient_idle_secs")]
    pub recipient_idle_secs: u64,
}

fn default_global_capacity() -> f64 {
    30.0
}

fn default_global_refill_per_sec() -> f64 {
    30.0
}

fn default_recipient_capacity() -> f64 {
    6.0
}

fn default_recipient_refill_per_sec() -> f64 {
    1.0
}

fn default_recipient_idle_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_capacity: default_global_capacity(),
            global_refill_per_sec: default_global_refill_per_sec(),
            recipient_capacity: default_recipient_capacity(),
            recipient_refill_per_sec: default_recipient_refill_per_sec(),
            recipient_idle_secs: default_recipient_idle_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn recipient_idle(&self) -> Duration {
        Duration::from_secs(self.recipient_idle_secs)
    }

    /// No waiting at all; handy for tests and dry runs
    pub fn unlimited() -> Self {
        Self {
            global_refill_per_sec: 0.0,
            recipient_refill_per_sec: 0.0,
            ..Default::default()
        }
    }
}
