//! Two-lane send queue

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::domain::Sendable;

use super::config::DispatchConfig;

/// Priority lane plus bulk lane
///
/// Producers only append. The sender loop is the only consumer and the only
/// remover: bulk entries stay in the map until their send attempt has
/// finished, priority entries are taken out wholesale.
pub struct DispatchQueue {
    config: DispatchConfig,
    bulk: Mutex<HashMap<String, Sendable>>,
    priority: Mutex<VecDeque<Sendable>>,
    has_priority: AtomicBool,
    work: Notify,
}

impl DispatchQueue {
    pub fn new(config: DispatchConfig) -> Self {
        debug!(?config, "DispatchQueue::new: called");
        Self {
            config,
            bulk: Mutex::new(HashMap::new()),
            priority: Mutex::new(VecDeque::new()),
            has_priority: AtomicBool::new(false),
            work: Notify::new(),
        }
    }

    /// Add a sendable, setting its token cost from the payload size
    ///
    /// Returns the queue key.
    pub async fn enqueue(&self, mut sendable: Sendable, high_priority: bool) -> String {
        sendable.token_cost = self.config.token_cost(sendable.payload.byte_len());
        sendable.priority = high_priority;
        let id = sendable.id.clone();
        debug!(%id, kind = %sendable.kind, recipients = sendable.recipients.len(), high_priority, cost = sendable.token_cost, "DispatchQueue::enqueue: called");

        if high_priority {
            let mut lane = self.priority.lock().await;
            lane.push_back(sendable);
            self.has_priority.store(true, Ordering::Release);
        } else {
            let mut lane = self.bulk.lock().await;
            lane.insert(id.clone(), sendable);
        }

        self.work.notify_one();
        id
    }

    /// Copy of the bulk lane in enqueue order
    pub async fn bulk_snapshot(&self) -> Vec<Sendable> {
        let lane = self.bulk.lock().await;
        let mut items: Vec<Sendable> = lane.values().cloned().collect();
        // Ids are UUIDv7, so lexical order is creation order
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    /// Remove a finished bulk entry
    pub async fn remove_bulk(&self, id: &str) -> Option<Sendable> {
        debug!(%id, "DispatchQueue::remove_bulk: called");
        self.bulk.lock().await.remove(id)
    }

    /// Take every priority entry and clear the flag
    pub async fn take_priority(&self) -> Vec<Sendable> {
        let mut lane = self.priority.lock().await;
        self.has_priority.store(false, Ordering::Release);
        lane.drain(..).collect()
    }

    /// Cheap check used between recipients of a batch
    pub fn has_priority(&self) -> bool {
        self.has_priority.load(Ordering::Acquire)
    }

    pub async fn bulk_len(&self) -> usize {
        self.bulk.lock().await.len()
    }

    pub async fn priority_len(&self) -> usize {
        self.priority.lock().await.len()
    }

    /// Wait for an enqueue, up to `timeout`
    ///
    /// Returns true if woken by new work.
    pub async fn wait_for_work(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.work.notified()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Payload, Recipient, SentMessage};

    fn queue() -> DispatchQueue {
        DispatchQueue::new(DispatchConfig::default())
    }

    fn command(text: &str) -> Sendable {
        Sendable::command(Recipient::new("1"), Payload::text(text))
    }

    #[tokio::test]
    async fn test_token_cost_from_payload_size() {
        let queue = queue();
        queue.enqueue(command(&"x".repeat(511)), false).await;
        queue.enqueue(command(&"x".repeat(512)), false).await;

        let costs: Vec<u32> = queue.bulk_snapshot().await.iter().map(|s| s.token_cost).collect();
        assert_eq!(costs, vec![1, 6]);
    }

    #[tokio::test]
    async fn test_priority_lane_and_flag() {
        let queue = queue();
        assert!(!queue.has_priority());

        queue.enqueue(command("bulk"), false).await;
        queue.enqueue(command("first"), true).await;
        queue.enqueue(command("second"), true).await;

        assert!(queue.has_priority());
        assert_eq!(queue.bulk_len().await, 1);
        assert_eq!(queue.priority_len().await, 2);

        let taken = queue.take_priority().await;
        let texts: Vec<&str> = taken.iter().map(|s| s.payload.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert!(taken.iter().all(|s| s.priority));
        assert!(!queue.has_priority());
        assert_eq!(queue.priority_len().await, 0);
        assert_eq!(queue.bulk_len().await, 1);
    }

    #[tokio::test]
    async fn test_bulk_snapshot_keeps_entries() {
        let queue = queue();
        let first = queue.enqueue(command("a"), false).await;
        let second = queue.enqueue(command("b"), false).await;

        let snapshot = queue.bulk_snapshot().await;
        assert_eq!(snapshot.iter().map(|s| s.id.clone()).collect::<Vec<_>>(), vec![first.clone(), second]);
        assert_eq!(queue.bulk_len().await, 2);

        assert!(queue.remove_bulk(&first).await.is_some());
        assert!(queue.remove_bulk(&first).await.is_none());
        assert_eq!(queue.bulk_len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_sendable_costs_base() {
        let queue = queue();
        queue
            .enqueue(Sendable::delete(vec![SentMessage::new("1", "5")]), false)
            .await;
        assert_eq!(queue.bulk_snapshot().await[0].token_cost, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_work() {
        let queue = queue();
        assert!(!queue.wait_for_work(Duration::from_millis(50)).await);

        queue.enqueue(command("a"), false).await;
        assert!(queue.wait_for_work(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_concurrent_producers() {
        let queue = std::sync::Arc::new(queue());
        let mut handles = Vec::new();
        for i in 0..8 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..10 {
                    queue.enqueue(command(&format!("{}-{}", i, j)), j % 2 == 0).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(queue.bulk_len().await, 40);
        assert_eq!(queue.priority_len().await, 40);
    }
}
