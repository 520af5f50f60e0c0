//! In-memory store

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Store, StoreError, Subscriber, SubscriberLookup};
use crate::domain::{ClassSet, Event, NotificationClass, Recipient, SentMessage};

/// A persistence call seen by [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    NotificationState { event_id: String, sent: ClassSet, delivered: u64 },
    SentIds { event_id: String, ids: Vec<SentMessage> },
    RemoveSubscriber(String),
}

#[derive(Debug, Default)]
struct MemoryInner {
    events: BTreeMap<String, Event>,
    subscribers: BTreeMap<String, Subscriber>,
    calls: Vec<StoreCall>,
    fail_writes: bool,
}

/// Store kept entirely in memory, recording every persistence call
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the listing returned by [`Store::refresh`]
    pub async fn set_events(&self, events: Vec<Event>) {
        let mut inner = self.inner.lock().await;
        inner.events = events.into_iter().map(|e| (e.id.clone(), e)).collect();
    }

    pub async fn add_subscriber(&self, subscriber: Subscriber) {
        let mut inner = self.inner.lock().await;
        inner.subscribers.insert(subscriber.recipient.id.clone(), subscriber);
    }

    pub async fn subscribers(&self) -> Vec<Subscriber> {
        self.inner.lock().await.subscribers.values().cloned().collect()
    }

    pub async fn event(&self, id: &str) -> Option<Event> {
        self.inner.lock().await.events.get(id).cloned()
    }

    /// Persistence calls in the order they were made
    pub async fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().await.calls.clone()
    }

    /// Make every persistence call fail
    pub async fn fail_writes(&self, fail: bool) {
        self.inner.lock().await.fail_writes = fail;
    }
}

fn check_writable(inner: &MemoryInner) -> Result<(), StoreError> {
    if inner.fail_writes {
        return Err(StoreError::Unavailable("writes disabled".to_string()));
    }
    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    async fn refresh(&self) -> Result<Vec<Event>, StoreError> {
        debug!("MemoryStore::refresh: called");
        Ok(self.inner.lock().await.events.values().cloned().collect())
    }

    async fn persist_notification_state(&self, event: &Event) -> Result<(), StoreError> {
        debug!(event_id = %event.id, "MemoryStore::persist_notification_state: called");
        let mut inner = self.inner.lock().await;
        check_writable(&inner)?;
        if let Some(stored) = inner.events.get_mut(&event.id) {
            stored.sent = event.sent;
            stored.delivered = event.delivered;
        }
        inner.calls.push(StoreCall::NotificationState {
            event_id: event.id.clone(),
            sent: event.sent,
            delivered: event.delivered,
        });
        Ok(())
    }

    async fn persist_sent_ids(&self, event_id: &str, ids: &[SentMessage]) -> Result<(), StoreError> {
        debug!(%event_id, count = ids.len(), "MemoryStore::persist_sent_ids: called");
        let mut inner = self.inner.lock().await;
        check_writable(&inner)?;
        if let Some(stored) = inner.events.get_mut(event_id) {
            stored.sent_ids = ids.to_vec();
        }
        inner.calls.push(StoreCall::SentIds {
            event_id: event_id.to_string(),
            ids: ids.to_vec(),
        });
        Ok(())
    }

    async fn remove_subscriber(&self, recipient: &str) -> Result<(), StoreError> {
        debug!(%recipient, "MemoryStore::remove_subscriber: called");
        let mut inner = self.inner.lock().await;
        check_writable(&inner)?;
        inner.subscribers.remove(recipient);
        inner.calls.push(StoreCall::RemoveSubscriber(recipient.to_string()));
        Ok(())
    }
}

#[async_trait]
impl SubscriberLookup for MemoryStore {
    async fn recipients(&self, event_id: &str, class: NotificationClass) -> Result<Vec<Recipient>, StoreError> {
        debug!(%event_id, %class, "MemoryStore::recipients: called");
        let inner = self.inner.lock().await;
        let event = inner
            .events
            .get(event_id)
            .ok_or_else(|| StoreError::NotFound(event_id.to_string()))?;
        Ok(inner
            .subscribers
            .values()
            .filter(|s| s.wants(&event.name, class))
            .map(|s| s.recipient.clone())
            .collect())
    }
}
