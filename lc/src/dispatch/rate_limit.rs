//! Token buckets gating the sender
//!
//! Every send reserves tokens from the global bucket and from the
//! recipient's own bucket. Reservations may drive a bucket into debt; the
//! caller then sleeps until the debt is repaid.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::config::RateLimitConfig;

/// A refilling token bucket that allows debt
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    available: f64,
    last_refill: Instant,
    last_used: Instant,
}

impl TokenBucket {
    /// A full bucket; `refill_per_sec` of zero never throttles
    pub fn new(capacity: f64, refill_per_sec: f64, now: Instant) -> Self {
        let capacity = capacity.max(1.0);
        Self {
            capacity,
            refill_per_sec,
            available: capacity,
            last_refill: now,
            last_used: now,
        }
    }

    fn unlimited(&self) -> bool {
        self.refill_per_sec <= 0.0
    }

    fn refill(&mut self, now: Instant) {
        if now > self.last_refill {
            let elapsed = now.duration_since(self.last_refill).as_secs_f64();
            self.available = (self.available + elapsed * self.refill_per_sec).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Take `tokens` and return how long the caller must wait before using them
    pub fn reserve_at(&mut self, tokens: f64, now: Instant) -> Duration {
        self.last_used = now;
        if self.unlimited() || tokens <= 0.0 {
            return Duration::ZERO;
        }

        self.refill(now);
        self.available -= tokens;
        if self.available >= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(-self.available / self.refill_per_sec)
    }

    /// Push the bucket into debt so nothing is granted for `wait`
    pub fn penalize(&mut self, wait: Duration, now: Instant) {
        if self.unlimited() {
            return;
        }
        self.refill(now);
        let debt = -(wait.as_secs_f64() * self.refill_per_sec);
        self.available = self.available.min(debt);
    }

    pub fn available_at(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.available
    }

    /// Full and unused for at least `idle`
    pub fn is_idle(&mut self, now: Instant, idle: Duration) -> bool {
        self.refill(now);
        self.available >= self.capacity && now.duration_since(self.last_used) >= idle
    }
}

/// Global plus per-recipient limiter, owned by the sender loop
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    global: TokenBucket,
    recipients: HashMap<String, TokenBucket>,
    last_prune: Instant,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        debug!(?config, "RateLimiter::new: called");
        let now = Instant::now();
        Self {
            global: TokenBucket::new(config.global_capacity, config.global_refill_per_sec, now),
            recipients: HashMap::new(),
            last_prune: now,
            config,
        }
    }

    /// Reserve tokens in both buckets, returning the longer of the two waits
    pub fn reserve_at(&mut self, recipient: &str, tokens: u32, now: Instant) -> Duration {
        self.prune(now);
        let tokens = f64::from(tokens);
        let global = self.global.reserve_at(tokens, now);
        let capacity = self.config.recipient_capacity;
        let refill = self.config.recipient_refill_per_sec;
        let own = self
            .recipients
            .entry(recipient.to_string())
            .or_insert_with(|| TokenBucket::new(capacity, refill, now))
            .reserve_at(tokens, now);
        global.max(own)
    }

    /// Wait until `tokens` may be spent on `recipient`
    ///
    /// Returns false when cancelled before the wait finished.
    pub async fn acquire(&mut self, recipient: &str, tokens: u32, cancel: &CancellationToken) -> bool {
        let wait = self.reserve_at(recipient, tokens, Instant::now());
        if wait.is_zero() {
            return true;
        }

        debug!(%recipient, tokens, ?wait, "RateLimiter::acquire: waiting");
        tokio::select! {
            _ = tokio::time::sleep(wait) => true,
            _ = cancel.cancelled() => false,
        }
    }

    /// Stop granting global tokens for `retry_after`
    pub fn penalize(&mut self, retry_after: Duration) {
        debug!(?retry_after, "RateLimiter::penalize: called");
        self.global.penalize(retry_after, Instant::now());
    }

    /// Number of per-recipient buckets currently tracked
    pub fn tracked_recipients(&self) -> usize {
        self.recipients.len()
    }

    fn prune(&mut self, now: Instant) {
        let idle = self.config.recipient_idle();
        if now.duration_since(self.last_prune) < idle {
            return;
        }
        self.recipients.retain(|_, bucket| !bucket.is_idle(now, idle));
        self.last_prune = now;
    }
}

/// Token cost after a rate-limit error, capped at `max`
pub fn penalized_cost(cost: u32, max: u32) -> u32 {
    cost.max(1).saturating_mul(2).min(max.max(1))
}
