//! launchcast - rate-limited launch notification dispatcher
//!
//! launchcast tells subscribers about upcoming rocket launches at fixed
//! offsets (24h, 12h, 1h, 5m) before a NET that keeps moving, over a chat
//! transport that throttles aggressively.
//!
//! # Core Concepts
//!
//! - **At most once per window**: a class is marked sent before it is queued
//! - **Slips re-open windows**: a NET moving later clears classes that are in the future again
//! - **Two lanes**: priority messages preempt long bulk fan-outs
//! - **Token buckets**: every send pays the global and the recipient's bucket
//!
//! # Modules
//!
//! - [`domain`] - Events, classes, recipients and sendables
//! - [`scheduler`] - Next-due search and slip detection
//! - [`tracker`] - In-memory EventStore
//! - [`dispatch`] - Queue, rate limiter and sender loop
//! - [`transport`] - Transport trait, Telegram and console bindings
//! - [`store`] - Persistence traits, SQLite and in-memory stores
//! - [`notifier`] - Watchers and message composition
//! - [`daemon`] - Task wiring and shutdown
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod domain;
pub mod notifier;
pub mod scheduler;
pub mod store;
pub mod tracker;
pub mod transport;

// Re-export commonly used types
pub use config::{Config, StorageConfig, TransportConfig};
pub use daemon::Daemon;
pub use dispatch::{DispatchConfig, DispatchQueue, LoopState, RateLimitConfig, RateLimiter, SenderLoop, SenderStats};
pub use domain::{
    ClassSet, ClassTable, Event, NotificationClass, Payload, Recipient, SendOptions, Sendable, SendableKind, SentMessage,
};
pub use notifier::{NotificationWatcher, NotifierConfig, RefreshWatcher};
pub use scheduler::{DueEntry, DueNotification, ScanOutcome, SchedulerConfig, SlipOutcome, detect_slip, find_next};
pub use store::{MemoryStore, SqliteStore, Store, StoreError, Subscriber, SubscriberLookup};
pub use tracker::{EventStore, Slip, UpdateSummary};
pub use transport::{ConsoleTransport, ErrorClass, TelegramTransport, Transport, TransportError, create_transport};
