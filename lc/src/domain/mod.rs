//! Domain types for launchcast
//!
//! Core domain types: Event, NotificationClass, Sendable.
//! Everything here is plain data; locking and persistence live elsewhere.

mod class;
mod event;
mod sendable;

pub use class::{ClassSet, ClassSpec, ClassTable, NotificationClass};
pub use event::{Event, Recipient, SentMessage};
pub use sendable::{LOCAL_TIME_PLACEHOLDER, Payload, SendOptions, Sendable, SendableKind, format_local_time};
