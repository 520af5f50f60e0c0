//! Dry-run transport that only logs

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use super::{Transport, TransportError};
use crate::domain::{Recipient, SendOptions};

/// Logs every message instead of delivering it
#[derive(Debug, Default)]
pub struct ConsoleTransport {
    next_id: AtomicU64,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send(&self, recipient: &Recipient, text: &str, options: &SendOptions) -> Result<String, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        info!(recipient = %recipient.id, message_id = id, silent = options.silent, "dry-run send: {}", text);
        Ok(id.to_string())
    }

    async fn delete(&self, recipient: &str, message_id: &str) -> Result<(), TransportError> {
        info!(%recipient, %message_id, "dry-run delete");
        Ok(())
    }
}
