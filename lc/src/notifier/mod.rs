//! Timers that feed the dispatch queue
//!
//! [`RefreshWatcher`] keeps the EventStore current and announces slips;
//! [`NotificationWatcher`] turns due notifications into sendables.

pub mod compose;
mod config;
mod refresh;
mod watcher;

pub use config::NotifierConfig;
pub use refresh::RefreshWatcher;
pub use watcher::NotificationWatcher;

/// Current wall clock as Unix seconds
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
