//! The sender loop
//!
//! A single long-running worker drains the queue. The priority lane always
//! goes first, and Idle looks at it before the bulk lane. Bulk work is copied
//! out under a short lock, sent without holding any queue lock, and removed
//! once every recipient has been tried. Only bulk batches are preempted; a
//! priority drain never yields to newer priority entries.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::{Recipient, SendableKind, Sendable, SentMessage};
use crate::store::Store;
use crate::tracker::EventStore;
use crate::transport::{ErrorClass, Transport, TransportError};

use super::config::DispatchConfig;
use super::queue::DispatchQueue;
use super::rate_limit::{RateLimiter, penalized_cost};

/// Sender loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Nothing in flight; checking the lanes
    Idle,
    /// Working through a snapshot of the bulk lane
    Draining,
    /// Sending every priority entry
    PriorityDrain,
}

/// Counters kept by the sender loop
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SenderStats {
    pub sent: u64,
    pub failed: u64,
    pub rate_limited: u64,
    pub removed_recipients: u64,
    pub deleted: u64,
    pub preemptions: u64,
    pub completed: u64,
}

/// Drains the [`DispatchQueue`] through a [`Transport`]
pub struct SenderLoop {
    queue: Arc<DispatchQueue>,
    limiter: RateLimiter,
    transport: Arc<dyn Transport>,
    store: Arc<dyn Store>,
    events: Arc<EventStore>,
    config: DispatchConfig,
    stats: Arc<Mutex<SenderStats>>,
}

impl SenderLoop {
    pub fn new(
        queue: Arc<DispatchQueue>,
        limiter: RateLimiter,
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
        events: Arc<EventStore>,
        config: DispatchConfig,
    ) -> Self {
        debug!(?config, "SenderLoop::new: called");
        Self {
            queue,
            limiter,
            transport,
            store,
            events,
            config,
            stats: Arc::new(Mutex::new(SenderStats::default())),
        }
    }

    /// Shared handle to the counters
    pub fn stats(&self) -> Arc<Mutex<SenderStats>> {
        self.stats.clone()
    }

    /// Run until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Sender loop started");
        let mut state = LoopState::Idle;
        while !cancel.is_cancelled() {
            state = self.step(state, &cancel).await;
        }
        let stats = self.stats.lock().await.clone();
        info!(?stats, "Sender loop stopped");
    }

    /// Perform one state transition
    pub async fn step(&mut self, state: LoopState, cancel: &CancellationToken) -> LoopState {
        match state {
            LoopState::Idle => self.idle(cancel).await,
            LoopState::Draining => {
                self.drain_bulk(cancel).await;
                LoopState::Idle
            }
            LoopState::PriorityDrain => {
                self.drain_priority(cancel).await;
                LoopState::Idle
            }
        }
    }

    async fn idle(&self, cancel: &CancellationToken) -> LoopState {
        if self.queue.has_priority() || self.queue.priority_len().await > 0 {
            return LoopState::PriorityDrain;
        }
        if self.queue.bulk_len().await > 0 {
            return LoopState::Draining;
        }

        tokio::select! {
            _ = self.queue.wait_for_work(self.config.idle_interval()) => {}
            _ = cancel.cancelled() => {}
        }
        LoopState::Idle
    }

    async fn drain_bulk(&mut self, cancel: &CancellationToken) {
        let batch = self.queue.bulk_snapshot().await;
        debug!(count = batch.len(), "SenderLoop::drain_bulk: called");

        for mut sendable in batch {
            if cancel.is_cancelled() {
                return;
            }
            if self.queue.has_priority() {
                self.drain_priority(cancel).await;
            }
            if !self.deliver(&mut sendable, cancel).await {
                info!(id = %sendable.id, kind = %sendable.kind, "Shutdown mid-send; sendable stays queued");
                return;
            }

            self.queue.remove_bulk(&sendable.id).await;
            if sendable.kind == SendableKind::Notification {
                self.finish_notification(&sendable).await;
            }
            self.stats.lock().await.completed += 1;
        }
    }

    /// Send every priority entry to every recipient; no bookkeeping
    ///
    /// Entries queued while this runs wait for the next drain.
    async fn drain_priority(&mut self, cancel: &CancellationToken) {
        let entries = self.queue.take_priority().await;
        debug!(count = entries.len(), "SenderLoop::drain_priority: called");

        let total = entries.len();
        for (done, mut sendable) in entries.into_iter().enumerate() {
            for index in 0..target_count(&sendable) {
                if cancel.is_cancelled() || !self.attempt(&mut sendable, index, cancel).await {
                    warn!(dropped = total - done, "Shutdown during priority drain");
                    return;
                }
            }
            self.stats.lock().await.completed += 1;
        }
    }

    /// Try every recipient (or every deletion target) of a bulk sendable once
    ///
    /// Batches yield to the priority lane every `preempt_interval` recipients.
    /// Returns false if cancelled before the last one was attempted.
    async fn deliver(&mut self, sendable: &mut Sendable, cancel: &CancellationToken) -> bool {
        let interval = self.config.preempt_interval.max(1);

        for index in 0..target_count(sendable) {
            if cancel.is_cancelled() {
                return false;
            }
            if sendable.is_batch && index % interval == 0 && self.queue.has_priority() {
                debug!(id = %sendable.id, index, "SenderLoop::deliver: preempted by priority lane");
                self.stats.lock().await.preemptions += 1;
                self.drain_priority(cancel).await;
                if cancel.is_cancelled() {
                    return false;
                }
            }
            if !self.attempt(sendable, index, cancel).await {
                return false;
            }
        }
        true
    }

    /// Send to (or delete for) the `index`th target
    async fn attempt(&mut self, sendable: &mut Sendable, index: usize, cancel: &CancellationToken) -> bool {
        match sendable.kind {
            SendableKind::Delete => {
                let target = sendable.message_ids[index].clone();
                self.delete_one(&target, sendable.token_cost, cancel).await
            }
            _ => {
                let recipient = sendable.recipients[index].clone();
                self.send_one(sendable, &recipient, cancel).await
            }
        }
    }

    async fn send_one(&mut self, sendable: &mut Sendable, recipient: &Recipient, cancel: &CancellationToken) -> bool {
        if !self.limiter.acquire(&recipient.id, sendable.token_cost, cancel).await {
            return false;
        }

        let text = sendable.render_for(recipient);
        let timeout = self.config.send_timeout();
        let result = match tokio::time::timeout(
            timeout,
            self.transport.send(recipient, &text, &sendable.payload.options),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        match result {
            Ok(message_id) => {
                debug!(recipient = %recipient.id, %message_id, "SenderLoop::send_one: delivered");
                sendable.record_sent(&recipient.id, message_id);
                self.stats.lock().await.sent += 1;
            }
            Err(err) => self.handle_send_error(sendable, recipient, err).await,
        }
        true
    }

    async fn handle_send_error(&mut self, sendable: &mut Sendable, recipient: &Recipient, err: TransportError) {
        self.stats.lock().await.failed += 1;

        match err.class() {
            ErrorClass::RateLimited => {
                let retry_after = err.retry_after().unwrap_or_default();
                let cost = penalized_cost(sendable.token_cost, self.config.max_token_cost);
                warn!(id = %sendable.id, recipient = %recipient.id, ?retry_after, cost, "Rate limited by transport; recipient skipped");
                sendable.token_cost = cost;
                self.limiter.penalize(retry_after);
                self.stats.lock().await.rate_limited += 1;
            }
            ErrorClass::RecipientGone => {
                warn!(recipient = %recipient.id, error = %err, "Recipient unreachable; removing subscriber");
                match self.store.remove_subscriber(&recipient.id).await {
                    Ok(()) => self.stats.lock().await.removed_recipients += 1,
                    Err(e) => error!(recipient = %recipient.id, error = %e, "Failed to remove subscriber"),
                }
            }
            ErrorClass::PayloadRejectedPermanent => {
                warn!(id = %sendable.id, recipient = %recipient.id, error = %err, "Payload rejected permanently");
            }
            ErrorClass::PayloadRejectedRecoverable | ErrorClass::Unknown => {
                warn!(id = %sendable.id, recipient = %recipient.id, error = %err, "Send failed; recipient skipped");
            }
        }
    }

    async fn delete_one(&mut self, target: &SentMessage, cost: u32, cancel: &CancellationToken) -> bool {
        if !self.limiter.acquire(&target.recipient, cost, cancel).await {
            return false;
        }

        let timeout = self.config.send_timeout();
        match tokio::time::timeout(timeout, self.transport.delete(&target.recipient, &target.message_id)).await {
            Ok(Ok(())) => {
                debug!(%target, "SenderLoop::delete_one: deleted");
                self.stats.lock().await.deleted += 1;
            }
            Ok(Err(err)) => warn!(%target, error = %err, "Delete failed"),
            Err(_) => warn!(%target, ?timeout, "Delete timed out"),
        }
        true
    }

    /// Record a finished notification and schedule cleanup of its predecessor
    ///
    /// With nothing delivered the previous message ids stay in place, so the
    /// old messages are neither orphaned nor deleted.
    async fn finish_notification(&self, sendable: &Sendable) {
        let delivered = sendable.message_ids.len() as u64;
        if delivered == 0 {
            info!(id = %sendable.id, events = ?sendable.event_ids, "Notification reached no recipients");
            return;
        }

        for event_id in &sendable.event_ids {
            let Some((event, previous)) = self
                .events
                .record_delivery(event_id, &sendable.message_ids, delivered)
                .await
            else {
                debug!(%event_id, "SenderLoop::finish_notification: event no longer tracked");
                continue;
            };
            info!(%event_id, delivered, class = ?sendable.class, "Notification delivered");

            if let Err(e) = self.store.persist_notification_state(&event).await {
                error!(%event_id, error = %e, "Failed to persist delivery statistics");
            }
            if !previous.is_empty() {
                debug!(%event_id, count = previous.len(), "SenderLoop::finish_notification: scheduling cleanup");
                self.queue.enqueue(Sendable::delete(previous), false).await;
            }
            if let Err(e) = self.store.persist_sent_ids(&event.id, &event.sent_ids).await {
                error!(%event_id, error = %e, "Failed to persist sent message ids");
            }
        }
    }
}

/// Recipients for a send, message ids for a delete
fn target_count(sendable: &Sendable) -> usize {
    match sendable.kind {
        SendableKind::Delete => sendable.message_ids.len(),
        _ => sendable.recipients.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::dispatch::RateLimitConfig;
    use crate::domain::{ClassTable, Event, NotificationClass, Payload, SendOptions};
    use crate::scheduler::SchedulerConfig;
    use crate::store::{MemoryStore, StoreCall};

    const NOW: i64 = 1_700_000_000;

    /// Transport that records traffic and fails on demand
    #[derive(Default)]
    struct RecordingTransport {
        sent: std::sync::Mutex<Vec<(String, String)>>,
        deleted: std::sync::Mutex<Vec<String>>,
        failures: HashMap<String, fn() -> TransportError>,
        delete_once: bool,
        /// Enqueue a priority message when this recipient is reached
        trigger: Option<(String, Arc<DispatchQueue>)>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, recipient: &Recipient, text: &str, _options: &SendOptions) -> Result<String, TransportError> {
            if let Some((at, queue)) = &self.trigger {
                if at == &recipient.id {
                    queue
                        .enqueue(Sendable::command(Recipient::new("admin"), Payload::text("urgent")), true)
                        .await;
                }
            }
            if let Some(make) = self.failures.get(&recipient.id) {
                return Err(make());
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((recipient.id.clone(), text.to_string()));
            Ok(sent.len().to_string())
        }

        async fn delete(&self, recipient: &str, message_id: &str) -> Result<(), TransportError> {
            let key = format!("{}:{}", recipient, message_id);
            let mut deleted = self.deleted.lock().unwrap();
            if self.delete_once && deleted.contains(&key) {
                return Err(TransportError::PayloadRejected {
                    message: "Bad Request: message to delete not found".to_string(),
                    permanent: false,
                });
            }
            deleted.push(key);
            Ok(())
        }
    }

    impl RecordingTransport {
        fn recipients(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
        }
    }

    struct Harness {
        queue: Arc<DispatchQueue>,
        store: Arc<MemoryStore>,
        events: Arc<EventStore>,
        transport: Arc<RecordingTransport>,
        sender: SenderLoop,
    }

    fn harness_with(transport: RecordingTransport, queue: Arc<DispatchQueue>, limits: RateLimitConfig) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(EventStore::new(Arc::new(ClassTable::standard()), SchedulerConfig::default()));
        let transport = Arc::new(transport);
        let sender = SenderLoop::new(
            queue.clone(),
            RateLimiter::new(limits),
            transport.clone(),
            store.clone(),
            events.clone(),
            DispatchConfig::default(),
        );
        Harness {
            queue,
            store,
            events,
            transport,
            sender,
        }
    }

    fn harness(transport: RecordingTransport) -> Harness {
        let queue = Arc::new(DispatchQueue::new(DispatchConfig::default()));
        harness_with(transport, queue, RateLimitConfig::unlimited())
    }

    fn recipients(prefix: &str, n: usize) -> Vec<Recipient> {
        (0..n).map(|i| Recipient::new(format!("{}{}", prefix, i))).collect()
    }

    async fn drain(sender: &mut SenderLoop, cancel: &CancellationToken) {
        let mut state = LoopState::Idle;
        for _ in 0..10 {
            state = sender.step(state, cancel).await;
            if state == LoopState::Idle && sender.queue.bulk_len().await == 0 && !sender.queue.has_priority() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_priority_preempts_bulk_drain() {
        let queue = Arc::new(DispatchQueue::new(DispatchConfig::default()));
        let transport = RecordingTransport {
            trigger: Some(("b3".to_string(), queue.clone())),
            ..Default::default()
        };
        let mut h = harness_with(transport, queue, RateLimitConfig::unlimited());
        let cancel = CancellationToken::new();

        let mut batch = Sendable::command(Recipient::new("b0"), Payload::text("bulk"));
        batch.recipients = recipients("b", 25);
        batch.is_batch = true;
        h.queue.enqueue(batch, false).await;

        assert_eq!(h.sender.step(LoopState::Idle, &cancel).await, LoopState::Draining);
        h.sender.step(LoopState::Draining, &cancel).await;

        let order = h.transport.recipients();
        assert_eq!(order.len(), 26);
        // Priority arrives while b3 is sent and is picked up at the next check (index 10)
        assert_eq!(order[10], "admin");
        assert_eq!(order[9], "b9");
        assert_eq!(order[11], "b10");
        assert_eq!(h.sender.stats.lock().await.preemptions, 1);
        assert_eq!(h.queue.bulk_len().await, 0);
    }

    #[tokio::test]
    async fn test_priority_arriving_during_priority_drain_waits_for_next_drain() {
        let queue = Arc::new(DispatchQueue::new(DispatchConfig::default()));
        let transport = RecordingTransport {
            trigger: Some(("p0".to_string(), queue.clone())),
            ..Default::default()
        };
        let mut h = harness_with(transport, queue, RateLimitConfig::unlimited());
        let cancel = CancellationToken::new();
        h.queue
            .enqueue(Sendable::command(Recipient::new("p0"), Payload::text("first")), true)
            .await;

        assert_eq!(h.sender.step(LoopState::PriorityDrain, &cancel).await, LoopState::Idle);
        assert_eq!(h.transport.recipients(), vec!["p0".to_string()]);
        assert!(h.queue.has_priority());
        assert_eq!(h.queue.priority_len().await, 1);

        assert_eq!(h.sender.step(LoopState::Idle, &cancel).await, LoopState::PriorityDrain);
        h.sender.step(LoopState::PriorityDrain, &cancel).await;
        assert_eq!(h.transport.recipients(), vec!["p0".to_string(), "admin".to_string()]);
        assert!(!h.queue.has_priority());
        assert_eq!(h.sender.stats.lock().await.completed, 2);
    }

    #[tokio::test]
    async fn test_idle_prefers_priority_lane() {
        let mut h = harness(RecordingTransport::default());
        let cancel = CancellationToken::new();
        h.queue
            .enqueue(Sendable::command(Recipient::new("bulk"), Payload::text("b")), false)
            .await;
        h.queue
            .enqueue(Sendable::command(Recipient::new("prio"), Payload::text("p")), true)
            .await;

        assert_eq!(h.sender.step(LoopState::Idle, &cancel).await, LoopState::PriorityDrain);
        drain(&mut h.sender, &cancel).await;
        assert_eq!(h.transport.recipients(), vec!["prio".to_string(), "bulk".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_cleanup_is_idempotent() {
        let mut h = harness(RecordingTransport {
            delete_once: true,
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let targets = vec![SentMessage::new("1", "10"), SentMessage::new("2", "11")];
        h.queue.enqueue(Sendable::delete(targets.clone()), false).await;
        h.queue.enqueue(Sendable::delete(targets), false).await;

        drain(&mut h.sender, &cancel).await;

        assert_eq!(h.queue.bulk_len().await, 0);
        let stats = h.sender.stats.lock().await.clone();
        assert_eq!(stats.deleted, 2);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.removed_recipients, 0);
        assert!(h.store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_recipient_gone_removes_subscriber() {
        let mut failures: HashMap<String, fn() -> TransportError> = HashMap::new();
        failures.insert("gone".to_string(), || {
            TransportError::RecipientGone("Forbidden: bot was blocked by the user".to_string())
        });
        failures.insert("flaky".to_string(), || TransportError::Timeout(Duration::from_secs(10)));
        let mut h = harness(RecordingTransport {
            failures,
            ..Default::default()
        });
        let cancel = CancellationToken::new();

        let mut sendable = Sendable::command(Recipient::new("a"), Payload::text("hi"));
        sendable.recipients = vec![
            Recipient::new("a"),
            Recipient::new("gone"),
            Recipient::new("flaky"),
            Recipient::new("b"),
        ];
        h.queue.enqueue(sendable, false).await;
        drain(&mut h.sender, &cancel).await;

        assert_eq!(h.transport.recipients(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(h.store.calls().await, vec![StoreCall::RemoveSubscriber("gone".to_string())]);
        let stats = h.sender.stats.lock().await.clone();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.removed_recipients, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_penalty_slows_sender() {
        let mut failures: HashMap<String, fn() -> TransportError> = HashMap::new();
        failures.insert("r1".to_string(), || TransportError::RateLimited {
            retry_after: Duration::from_secs(3),
        });
        let queue = Arc::new(DispatchQueue::new(DispatchConfig::default()));
        let mut h = harness_with(
            RecordingTransport {
                failures,
                ..Default::default()
            },
            queue,
            RateLimitConfig::default(),
        );
        let cancel = CancellationToken::new();

        let mut sendable = Sendable::command(Recipient::new("r1"), Payload::text("hi"));
        sendable.recipients = recipients("r", 3);
        h.queue.enqueue(sendable, false).await;

        let start = tokio::time::Instant::now();
        drain(&mut h.sender, &cancel).await;

        assert!(start.elapsed() >= Duration::from_secs(3));
        assert_eq!(h.transport.recipients(), vec!["r0".to_string(), "r2".to_string()]);
        assert_eq!(h.sender.stats.lock().await.rate_limited, 1);
    }

    #[tokio::test]
    async fn test_notification_bookkeeping() {
        let mut h = harness(RecordingTransport::default());
        let cancel = CancellationToken::new();

        let event = Event::new("ev", "Falcon 9", NOW + 3600);
        h.store.set_events(vec![event.clone()]).await;
        h.events.update(vec![event], NOW).await;
        h.events.record_delivery("ev", &[SentMessage::new("old", "1")], 1).await;

        let sendable = Sendable::notification(
            "ev",
            Some(NotificationClass::T1h),
            NOW + 3600,
            Payload::text("Liftoff at {local_time}"),
            recipients("s", 2),
        );
        h.queue.enqueue(sendable, false).await;
        h.sender.step(LoopState::Draining, &cancel).await;

        let tracked = h.events.get("ev").await.unwrap();
        assert_eq!(tracked.sent_ids, vec![SentMessage::new("s0", "1"), SentMessage::new("s1", "2")]);
        assert_eq!(tracked.delivered, 3);

        // Cleanup of the superseded message waits in the bulk lane
        let pending = h.queue.bulk_snapshot().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, SendableKind::Delete);
        assert_eq!(pending[0].message_ids, vec![SentMessage::new("old", "1")]);

        let calls = h.store.calls().await;
        assert!(matches!(calls[0], StoreCall::NotificationState { delivered: 3, .. }));
        assert!(matches!(calls[1], StoreCall::SentIds { ref ids, .. } if ids.len() == 2));
    }

    #[tokio::test]
    async fn test_undelivered_notification_keeps_previous_ids() {
        let mut failures: HashMap<String, fn() -> TransportError> = HashMap::new();
        failures.insert("s0".to_string(), || TransportError::Timeout(Duration::from_secs(1)));
        let mut h = harness(RecordingTransport {
            failures,
            ..Default::default()
        });
        let cancel = CancellationToken::new();

        h.events.update(vec![Event::new("ev", "A", NOW + 3600)], NOW).await;
        h.events.record_delivery("ev", &[SentMessage::new("old", "1")], 1).await;

        h.queue
            .enqueue(
                Sendable::notification("ev", None, NOW + 3600, Payload::text("x"), recipients("s", 1)),
                false,
            )
            .await;
        h.sender.step(LoopState::Draining, &cancel).await;

        assert_eq!(h.events.get("ev").await.unwrap().sent_ids, vec![SentMessage::new("old", "1")]);
        assert_eq!(h.queue.bulk_len().await, 0);
        assert!(h.store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_not_fatal() {
        let mut h = harness(RecordingTransport::default());
        let cancel = CancellationToken::new();
        h.store.fail_writes(true).await;
        h.events.update(vec![Event::new("ev", "A", NOW + 3600)], NOW).await;

        h.queue
            .enqueue(
                Sendable::notification("ev", None, NOW + 3600, Payload::text("x"), recipients("s", 2)),
                false,
            )
            .await;
        h.sender.step(LoopState::Draining, &cancel).await;

        // In-memory state stays authoritative
        assert_eq!(h.events.get("ev").await.unwrap().sent_ids.len(), 2);
        assert_eq!(h.queue.bulk_len().await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_sender_leaves_work_queued() {
        let mut h = harness(RecordingTransport::default());
        let cancel = CancellationToken::new();
        h.queue
            .enqueue(Sendable::command(Recipient::new("a"), Payload::text("x")), false)
            .await;
        cancel.cancel();

        h.sender.step(LoopState::Draining, &cancel).await;
        assert_eq!(h.queue.bulk_len().await, 1);
        assert!(h.transport.recipients().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let h = harness(RecordingTransport::default());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(h.sender.run(cancel.clone()));
        h.queue
            .enqueue(Sendable::command(Recipient::new("a"), Payload::text("x")), false)
            .await;

        tokio::time::timeout(Duration::from_secs(2), async {
            while h.transport.recipients().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}
