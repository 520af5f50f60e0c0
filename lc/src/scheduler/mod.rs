//! Notification scheduling
//!
//! - [`find_next`] picks the next due notification across tracked events
//! - [`detect_slip`] re-opens notification windows when a NET moves later

mod config;
mod core;
mod slip;

pub use config::SchedulerConfig;
pub use self::core::{DueEntry, DueNotification, ScanOutcome, SkippedClass, find_next};
pub use slip::{SlipOutcome, detect_slip};
