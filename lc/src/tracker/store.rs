//! In-memory EventStore

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

use crate::domain::{ClassTable, Event, NotificationClass, SentMessage};
use crate::scheduler::{DueEntry, ScanOutcome, SchedulerConfig, SlipOutcome, detect_slip, find_next};

/// An event whose NET changed during a refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slip {
    /// The event after the new NET was applied
    pub event: Event,
    pub old_net: i64,
    pub outcome: SlipOutcome,
}

/// What a refresh changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub slips: Vec<Slip>,
    /// Events whose live flag flipped
    pub live_changed: Vec<String>,
    pub tracked: usize,
}

impl UpdateSummary {
    /// Anything that could move the next due notification
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.slips.is_empty() || !self.live_changed.is_empty()
    }
}

/// Tracked events keyed by id
///
/// The refresh path replaces the contents wholesale while carrying each
/// event's notification state forward; the scheduler reads and marks state
/// under the same lock.
pub struct EventStore {
    table: Arc<ClassTable>,
    config: SchedulerConfig,
    inner: Mutex<BTreeMap<String, Event>>,
    changed: Notify,
}

impl EventStore {
    pub fn new(table: Arc<ClassTable>, config: SchedulerConfig) -> Self {
        debug!(?config, "EventStore::new: called");
        Self {
            table,
            config,
            inner: Mutex::new(BTreeMap::new()),
            changed: Notify::new(),
        }
    }

    pub fn table(&self) -> &ClassTable {
        &self.table
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Replace tracked events with a fresh upstream listing
    ///
    /// Concluded events and ids missing from `fresh` are dropped. Events seen
    /// before inherit their sent flags and message ids, then have the new NET
    /// applied through slip detection.
    pub async fn update(&self, fresh: Vec<Event>, now: i64) -> UpdateSummary {
        debug!(count = fresh.len(), now, "EventStore::update: called");
        let mut inner = self.inner.lock().await;
        let mut previous = std::mem::take(&mut *inner);
        let mut summary = UpdateSummary::default();

        for mut event in fresh {
            let old = previous.remove(&event.id);
            if event.concluded {
                debug!(event_id = %event.id, "EventStore::update: concluded, dropping");
                if old.is_some() {
                    summary.removed.push(event.id);
                }
                continue;
            }

            match old {
                Some(old) => {
                    if old.live != event.live {
                        debug!(event_id = %event.id, live = event.live, "EventStore::update: live flag changed");
                        summary.live_changed.push(event.id.clone());
                    }
                    event.inherit_state(&old);
                    let new_net = event.net;
                    event.net = old.net;
                    let outcome = detect_slip(&mut event, new_net, &self.table, &self.config, now);
                    if outcome.changed {
                        summary.slips.push(Slip {
                            event: event.clone(),
                            old_net: old.net,
                            outcome,
                        });
                    }
                }
                None => summary.added.push(event.id.clone()),
            }

            inner.insert(event.id.clone(), event);
        }

        summary.removed.extend(previous.into_keys());
        summary.tracked = inner.len();
        drop(inner);

        if summary.has_changes() {
            info!(
                added = summary.added.len(),
                removed = summary.removed.len(),
                slips = summary.slips.len(),
                live_changed = summary.live_changed.len(),
                tracked = summary.tracked,
                "Tracked events updated"
            );
            self.changed.notify_waiters();
        }

        summary
    }

    /// Scan for the next due notification
    pub async fn find_next(&self, now: i64) -> ScanOutcome {
        debug!(now, "EventStore::find_next: called");
        let mut inner = self.inner.lock().await;
        find_next(inner.values_mut(), &self.table, &self.config, now)
    }

    /// Mark due entries sent, returning the events that actually transitioned
    ///
    /// Entries whose event disappeared, is no longer live, or already has the
    /// class marked are skipped, so a due notification is delivered at most once.
    pub async fn mark_sent(&self, entries: &[DueEntry]) -> Vec<(Event, NotificationClass)> {
        debug!(count = entries.len(), "EventStore::mark_sent: called");
        let mut inner = self.inner.lock().await;
        let mut marked = Vec::new();

        for entry in entries {
            let Some(event) = inner.get_mut(&entry.event_id) else {
                debug!(event_id = %entry.event_id, "EventStore::mark_sent: event gone");
                continue;
            };
            if !event.live || event.concluded {
                continue;
            }
            if event.sent.insert(entry.class) {
                marked.push((event.clone(), entry.class));
            } else {
                debug!(event_id = %entry.event_id, class = %entry.class, "EventStore::mark_sent: already sent");
            }
        }

        marked
    }

    /// Store the messages of a finished notification
    ///
    /// Returns the updated event and the message ids it replaced.
    pub async fn record_delivery(
        &self,
        event_id: &str,
        sent: &[SentMessage],
        delivered: u64,
    ) -> Option<(Event, Vec<SentMessage>)> {
        debug!(%event_id, sent = sent.len(), delivered, "EventStore::record_delivery: called");
        let mut inner = self.inner.lock().await;
        let event = inner.get_mut(event_id)?;
        event.delivered += delivered;
        let previous = std::mem::replace(&mut event.sent_ids, sent.to_vec());
        Some((event.clone(), previous))
    }

    pub async fn get(&self, id: &str) -> Option<Event> {
        self.inner.lock().await.get(id).cloned()
    }

    /// All tracked events in id order
    pub async fn snapshot(&self) -> Vec<Event> {
        self.inner.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Resolves on the next [`EventStore::update`] that changed anything
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}
