//! Outbound message dispatch
//!
//! - [`DispatchQueue`] holds queued sendables in a priority and a bulk lane
//! - [`RateLimiter`] gates every send with global and per-recipient buckets
//! - [`SenderLoop`] drains the queue and does post-send bookkeeping

mod config;
mod queue;
mod rate_limit;
mod sender;

pub use config::{DispatchConfig, RateLimitConfig};
pub use queue::DispatchQueue;
pub use rate_limit::{RateLimiter, TokenBucket, penalized_cost};
pub use sender::{LoopState, SenderLoop, SenderStats};
