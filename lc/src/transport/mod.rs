//! Message transports
//!
//! The dispatch engine only sees the [`Transport`] trait. Telegram is the
//! production binding; the console transport backs `lc run --dry-run`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

mod console;
mod error;
mod telegram;

pub use console::ConsoleTransport;
pub use error::{ErrorClass, TransportError};
pub use telegram::{TelegramTransport, classify};

use crate::config::TransportConfig;
use crate::domain::{Recipient, SendOptions};

/// Opaque delivery primitive
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `text` to one recipient, returning the transport's message id
    async fn send(&self, recipient: &Recipient, text: &str, options: &SendOptions) -> Result<String, TransportError>;

    /// Best-effort removal of a previously sent message
    async fn delete(&self, recipient: &str, message_id: &str) -> Result<(), TransportError>;
}

/// Create the transport selected by the run mode
pub fn create_transport(config: &TransportConfig, dry_run: bool) -> Result<Arc<dyn Transport>, TransportError> {
    debug!(dry_run, "create_transport: called");
    if dry_run {
        return Ok(Arc::new(ConsoleTransport::new()));
    }
    Ok(Arc::new(TelegramTransport::from_config(config)?))
}
