//! Persistence collaborators
//!
//! The dispatch engine talks to storage through two narrow traits:
//! [`Store`] for event refreshes and persistence calls, and
//! [`SubscriberLookup`] for resolving who gets a notification. Each call is
//! atomic on its own; none is transactional with the in-memory state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod memory;
mod sqlite;

pub use memory::{MemoryStore, StoreCall};
pub use sqlite::SqliteStore;

use crate::domain::{ClassSet, Event, NotificationClass, Recipient, SentMessage};

/// Errors from a storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Event source and persistence sink
#[async_trait]
pub trait Store: Send + Sync {
    /// Current upstream listing of events
    async fn refresh(&self) -> Result<Vec<Event>, StoreError>;

    /// Persist sent flags and delivery count
    async fn persist_notification_state(&self, event: &Event) -> Result<(), StoreError>;

    /// Persist the message ids of the latest notification
    async fn persist_sent_ids(&self, event_id: &str, ids: &[SentMessage]) -> Result<(), StoreError>;

    /// Drop a recipient that can no longer be reached
    async fn remove_subscriber(&self, recipient: &str) -> Result<(), StoreError>;
}

/// Recipient resolution for a notification
#[async_trait]
pub trait SubscriberLookup: Send + Sync {
    async fn recipients(&self, event_id: &str, class: NotificationClass) -> Result<Vec<Recipient>, StoreError>;
}

/// A chat subscribed to launch notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub recipient: Recipient,

    /// Classes this subscriber wants
    #[serde(default = "ClassSet::all")]
    pub classes: ClassSet,

    /// Only events whose name contains one of these (case-insensitive); empty matches all
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Subscriber {
    /// Subscribed to every class with no keyword filter
    pub fn new(recipient: Recipient) -> Self {
        Self {
            recipient,
            classes: ClassSet::all(),
            keywords: Vec::new(),
        }
    }

    pub fn with_classes(mut self, classes: ClassSet) -> Self {
        self.classes = classes;
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Should this subscriber hear about `class` for an event named `event_name`
    pub fn wants(&self, event_name: &str, class: NotificationClass) -> bool {
        if !self.classes.contains(class) {
            return false;
        }
        if self.keywords.is_empty() {
            return true;
        }
        let name = event_name.to_lowercase();
        self.keywords.iter().any(|k| name.contains(&k.to_lowercase()))
    }
}
