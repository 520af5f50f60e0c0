//! Periodic refresh from the store

use std::collections::HashSet;
use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::DispatchQueue;
use crate::domain::{Recipient, Sendable};
use crate::store::{Store, StoreError, SubscriberLookup};
use crate::tracker::{EventStore, Slip, UpdateSummary};

use super::compose;
use super::config::NotifierConfig;
use super::unix_now;

/// Pulls the upstream listing into the EventStore and announces slips
pub struct RefreshWatcher {
    events: Arc<EventStore>,
    queue: Arc<DispatchQueue>,
    store: Arc<dyn Store>,
    lookup: Arc<dyn SubscriberLookup>,
    config: NotifierConfig,
}

impl RefreshWatcher {
    pub fn new(
        events: Arc<EventStore>,
        queue: Arc<DispatchQueue>,
        store: Arc<dyn Store>,
        lookup: Arc<dyn SubscriberLookup>,
        config: NotifierConfig,
    ) -> Self {
        Self {
            events,
            queue,
            store,
            lookup,
            config,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(interval = ?self.config.refresh_interval(), "Refresh watcher started");
        let mut interval = tokio::time::interval(self.config.refresh_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.refresh_once(unix_now()).await {
                        warn!(error = %e, "Refresh failed");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
        info!("Refresh watcher stopped");
    }

    /// Apply one upstream listing
    pub async fn refresh_once(&self, now: i64) -> Result<UpdateSummary, StoreError> {
        debug!(now, "RefreshWatcher::refresh_once: called");
        let fresh = self.store.refresh().await?;
        let summary = self.events.update(fresh, now).await;

        for slip in &summary.slips {
            if slip.outcome.reset.is_empty() {
                continue;
            }
            if let Err(e) = self.store.persist_notification_state(&slip.event).await {
                error!(event_id = %slip.event.id, error = %e, "Failed to persist reset classes");
            }
            if slip.outcome.needs_postponement() {
                self.enqueue_postponement(slip).await;
            }
        }

        Ok(summary)
    }

    /// Queue a postponement for subscribers of any reset class
    ///
    /// Returns the number of recipients.
    pub async fn enqueue_postponement(&self, slip: &Slip) -> usize {
        let event = &slip.event;
        let mut seen = HashSet::new();
        let mut recipients: Vec<Recipient> = Vec::new();

        for class in slip.outcome.reset.iter() {
            match self.lookup.recipients(&event.id, class).await {
                Ok(found) => {
                    for recipient in found {
                        if seen.insert(recipient.id.clone()) {
                            recipients.push(recipient);
                        }
                    }
                }
                Err(e) => error!(event_id = %event.id, %class, error = %e, "Subscriber lookup failed"),
            }
        }

        if recipients.is_empty() {
            debug!(event_id = %event.id, "RefreshWatcher::enqueue_postponement: nobody to tell");
            return 0;
        }

        let count = recipients.len();
        info!(event_id = %event.id, old_net = slip.old_net, new_net = event.net, recipients = count, "Queueing postponement");
        let payload = compose::postponement_payload(event, slip.old_net);
        let sendable = Sendable::notification(event.id.clone(), None, event.net, payload, recipients);
        self.queue.enqueue(sendable, false).await;
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchConfig;
    use crate::domain::{ClassTable, Event, NotificationClass};
    use crate::scheduler::{DueEntry, SchedulerConfig};
    use crate::store::{MemoryStore, StoreCall, Subscriber};

    const NOW: i64 = 1_700_000_000;
    const HOUR: i64 = 3600;

    fn watcher(store: Arc<MemoryStore>) -> (RefreshWatcher, Arc<EventStore>, Arc<DispatchQueue>) {
        let events = Arc::new(EventStore::new(Arc::new(ClassTable::standard()), SchedulerConfig::default()));
        let queue = Arc::new(DispatchQueue::new(DispatchConfig::default()));
        let watcher = RefreshWatcher::new(
            events.clone(),
            queue.clone(),
            store.clone(),
            store,
            NotifierConfig::default(),
        );
        (watcher, events, queue)
    }

    #[tokio::test]
    async fn test_postponement_only_to_reset_class_subscribers() {
        let store = Arc::new(MemoryStore::new());
        store.set_events(vec![Event::new("a", "Falcon 9", NOW + 26 * HOUR)]).await;
        store
            .add_subscriber(
                Subscriber::new(Recipient::new("day"))
                    .with_classes([NotificationClass::T24h].into_iter().collect()),
            )
            .await;
        store
            .add_subscriber(
                Subscriber::new(Recipient::new("hour"))
                    .with_classes([NotificationClass::T1h].into_iter().collect()),
            )
            .await;
        let (watcher, events, queue) = watcher(store.clone());

        watcher.refresh_once(NOW).await.unwrap();
        events
            .mark_sent(&[DueEntry {
                event_id: "a".to_string(),
                class: NotificationClass::T24h,
            }])
            .await;

        store.set_events(vec![Event::new("a", "Falcon 9", NOW + 50 * HOUR)]).await;
        let summary = watcher.refresh_once(NOW).await.unwrap();

        assert_eq!(summary.slips.len(), 1);
        assert!(!events.get("a").await.unwrap().is_sent(NotificationClass::T24h));

        let queued = queue.bulk_snapshot().await;
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].recipients, vec![Recipient::new("day")]);
        assert_eq!(queued[0].class, None);
        assert!(queued[0].payload.text.contains("postponed by 1d"));

        assert!(store.calls().await.iter().any(
            |c| matches!(c, StoreCall::NotificationState { event_id, sent, .. } if event_id == "a" && sent.is_empty())
        ));
    }

    #[tokio::test]
    async fn test_postponement_recipients_deduplicated() {
        let store = Arc::new(MemoryStore::new());
        store.set_events(vec![Event::new("a", "Falcon 9", NOW + 11 * HOUR)]).await;
        store.add_subscriber(Subscriber::new(Recipient::new("all"))).await;
        let (watcher, events, queue) = watcher(store.clone());

        watcher.refresh_once(NOW).await.unwrap();
        events
            .mark_sent(&[
                DueEntry {
                    event_id: "a".to_string(),
                    class: NotificationClass::T24h,
                },
                DueEntry {
                    event_id: "a".to_string(),
                    class: NotificationClass::T12h,
                },
            ])
            .await;

        store.set_events(vec![Event::new("a", "Falcon 9", NOW + 48 * HOUR)]).await;
        watcher.refresh_once(NOW).await.unwrap();

        let queued = queue.bulk_snapshot().await;
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].recipients, vec![Recipient::new("all")]);
    }

    #[tokio::test]
    async fn test_small_slip_is_silent() {
        let store = Arc::new(MemoryStore::new());
        store.set_events(vec![Event::new("a", "Falcon 9", NOW + 23 * HOUR)]).await;
        store.add_subscriber(Subscriber::new(Recipient::new("all"))).await;
        let (watcher, events, queue) = watcher(store.clone());

        watcher.refresh_once(NOW).await.unwrap();
        events
            .mark_sent(&[DueEntry {
                event_id: "a".to_string(),
                class: NotificationClass::T24h,
            }])
            .await;

        // Moves two minutes: the 24h window stays in the past
        store.set_events(vec![Event::new("a", "Falcon 9", NOW + 23 * HOUR + 120)]).await;
        let summary = watcher.refresh_once(NOW).await.unwrap();

        assert_eq!(summary.slips.len(), 1);
        assert!(summary.slips[0].outcome.reset.is_empty());
        assert_eq!(queue.bulk_len().await, 0);
    }
}
