//! Daemon wiring
//!
//! Builds the shared EventStore and DispatchQueue, then runs the refresh
//! watcher, the notification watcher and the sender loop until the shared
//! cancellation token fires.

use std::sync::Arc;

use eyre::{Context, Result};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dispatch::{DispatchQueue, RateLimiter, SenderLoop, SenderStats};
use crate::domain::{ClassTable, Recipient, Sendable};
use crate::notifier::{NotificationWatcher, RefreshWatcher, compose, unix_now};
use crate::store::{Store, SubscriberLookup};
use crate::tracker::EventStore;
use crate::transport::Transport;

/// All long-running tasks and the state they share
pub struct Daemon {
    config: Config,
    events: Arc<EventStore>,
    queue: Arc<DispatchQueue>,
    store: Arc<dyn Store>,
    lookup: Arc<dyn SubscriberLookup>,
    transport: Arc<dyn Transport>,
    dry_run: bool,
}

impl Daemon {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        lookup: Arc<dyn SubscriberLookup>,
        transport: Arc<dyn Transport>,
        dry_run: bool,
    ) -> Self {
        debug!(dry_run, "Daemon::new: called");
        let table = Arc::new(ClassTable::standard());
        let events = Arc::new(EventStore::new(table, config.scheduler.clone()));
        let queue = Arc::new(DispatchQueue::new(config.dispatch.clone()));
        Self {
            config,
            events,
            queue,
            store,
            lookup,
            transport,
            dry_run,
        }
    }

    pub fn events(&self) -> Arc<EventStore> {
        self.events.clone()
    }

    pub fn queue(&self) -> Arc<DispatchQueue> {
        self.queue.clone()
    }

    /// Run until `cancel` fires, returning the sender's final counters
    pub async fn run(self, cancel: CancellationToken) -> Result<SenderStats> {
        info!(dry_run = self.dry_run, "Daemon starting");

        let refresh = RefreshWatcher::new(
            self.events.clone(),
            self.queue.clone(),
            self.store.clone(),
            self.lookup.clone(),
            self.config.notifier.clone(),
        );
        match refresh.refresh_once(unix_now()).await {
            Ok(summary) => info!(tracked = summary.tracked, "Initial refresh complete"),
            Err(e) => warn!(error = %e, "Initial refresh failed; continuing with an empty event list"),
        }

        self.announce_startup().await;

        let sender = SenderLoop::new(
            self.queue.clone(),
            RateLimiter::new(self.config.rate_limit.clone()),
            self.transport.clone(),
            self.store.clone(),
            self.events.clone(),
            self.config.dispatch.clone(),
        );
        let stats: Arc<Mutex<SenderStats>> = sender.stats();

        let watcher = NotificationWatcher::new(
            self.events.clone(),
            self.queue.clone(),
            self.store.clone(),
            self.lookup.clone(),
            self.config.notifier.clone(),
        );

        let sender_handle = tokio::spawn(sender.run(cancel.clone()));
        let watcher_handle = tokio::spawn(watcher.run(cancel.clone()));
        let refresh_handle = tokio::spawn(refresh.run(cancel.clone()));
        info!("Daemon running");

        cancel.cancelled().await;
        info!("Daemon shutting down...");

        watcher_handle.await.context("Notification watcher panicked")?;
        refresh_handle.await.context("Refresh watcher panicked")?;
        sender_handle.await.context("Sender loop panicked")?;

        let stats = stats.lock().await.clone();
        info!(?stats, "Daemon stopped");
        Ok(stats)
    }

    /// Priority alert to the admin chat, if one is configured
    async fn announce_startup(&self) {
        let Some(admin) = &self.config.dispatch.admin_recipient else {
            return;
        };
        let tracked = self.events.len().await;
        let sendable = Sendable::command(Recipient::new(admin.clone()), compose::startup_payload(tracked, self.dry_run));
        self.queue.enqueue(sendable, true).await;
        debug!(%admin, "Daemon::announce_startup: queued");
    }
}
