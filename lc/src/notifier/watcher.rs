//! Due-time watcher

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::DispatchQueue;
use crate::domain::Sendable;
use crate::scheduler::DueNotification;
use crate::store::{Store, SubscriberLookup};
use crate::tracker::EventStore;

use super::compose;
use super::config::NotifierConfig;
use super::unix_now;

/// Turns due notifications into queued sendables
///
/// Sleeps until the next send time. A due notification found by a scan is
/// held and sent when its time arrives, so a slightly late class that was
/// pushed back by the reschedule delay is not re-judged against the slip
/// tolerance. Store changes and the poll interval trigger a fresh scan.
pub struct NotificationWatcher {
    events: Arc<EventStore>,
    queue: Arc<DispatchQueue>,
    store: Arc<dyn Store>,
    lookup: Arc<dyn SubscriberLookup>,
    config: NotifierConfig,
}

impl NotificationWatcher {
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
        info!("Notification watcher started");
        let mut pending: Option<DueNotification> = None;

        loop {
            if pending.is_none() {
                pending = self.scan(unix_now()).await;
            }

            let now = unix_now();
            if let Some(due) = pending.take_if(|d| d.is_due(now)) {
                self.dispatch(&due).await;
                continue;
            }

            let poll = self.config.poll_interval();
            let wait = pending
                .as_ref()
                .map(|d| Duration::from_secs((d.send_time - now).max(0) as u64).min(poll))
                .unwrap_or(poll);
            debug!(?wait, pending = pending.is_some(), "NotificationWatcher::run: sleeping");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    // Keep a due notification whose time has come; rescan otherwise
                    if !pending.as_ref().is_some_and(|d| d.is_due(unix_now())) {
                        pending = None;
                    }
                }
                _ = self.events.changed() => {
                    debug!("NotificationWatcher::run: events changed");
                    pending = None;
                }
                _ = cancel.cancelled() => break,
            }
        }
        info!("Notification watcher stopped");
    }

    /// Find the next due notification, persisting classes skipped as too late
    pub async fn scan(&self, now: i64) -> Option<DueNotification> {
        debug!(now, "NotificationWatcher::scan: called");
        let outcome = self.events.find_next(now).await;

        for skipped in &outcome.skipped {
            let Some(event) = self.events.get(&skipped.event_id).await else {
                continue;
            };
            if let Err(e) = self.store.persist_notification_state(&event).await {
                error!(event_id = %skipped.event_id, class = %skipped.class, error = %e, "Failed to persist skipped class");
            }
        }

        if let Some(due) = &outcome.due {
            debug!(class = %due.class, send_time = due.send_time, count = due.count(), "NotificationWatcher::scan: next due");
        }
        outcome.due
    }

    /// Mark a due notification sent and queue one sendable per event
    ///
    /// Returns the number of sendables queued.
    pub async fn dispatch(&self, due: &DueNotification) -> usize {
        info!(class = %due.class, events = ?due.event_ids().collect::<Vec<_>>(), "Notification due");
        let marked = self.events.mark_sent(&due.entries).await;
        let mut queued = 0;

        for (event, class) in marked {
            if let Err(e) = self.store.persist_notification_state(&event).await {
                error!(event_id = %event.id, error = %e, "Failed to persist notification state");
            }

            let recipients = match self.lookup.recipients(&event.id, class).await {
                Ok(recipients) => recipients,
                Err(e) => {
                    error!(event_id = %event.id, %class, error = %e, "Subscriber lookup failed");
                    continue;
                }
            };
            if recipients.is_empty() {
                warn!(event_id = %event.id, %class, "No subscribers for notification");
                continue;
            }

            let payload = compose::notification_payload(&event, class);
            let sendable = Sendable::notification(event.id.clone(), Some(class), event.net, payload, recipients);
            self.queue.enqueue(sendable, false).await;
            queued += 1;
        }

        queued
    }
}
