//! In-memory tracking of upstream events
//!
//! The EventStore owns every tracked event's notification state. Both the
//! refresh path and the scheduler go through its lock.

mod store;

pub use store::{EventStore, Slip, UpdateSummary};
