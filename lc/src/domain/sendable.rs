//! Sendable - a queued unit of outbound work

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::class::NotificationClass;
use super::event::{Recipient, SentMessage};

/// Placeholder replaced with the NET in the recipient's local time
pub const LOCAL_TIME_PLACEHOLDER: &str = "{local_time}";

/// What a Sendable does once it reaches the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendableKind {
    /// Launch notification or postponement; triggers post-send bookkeeping
    Notification,
    /// Command reply or admin alert
    Command,
    /// Removal of previously sent messages
    Delete,
}

impl std::fmt::Display for SendableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Notification => write!(f, "notification"),
            Self::Command => write!(f, "command"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Transport specific send options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Markup mode understood by the transport, e.g. "HTML"
    pub parse_mode: Option<String>,
    /// Deliver without sound
    pub silent: bool,
    pub disable_preview: bool,
}

/// Message text plus send options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub text: String,
    pub options: SendOptions,
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: SendOptions::default(),
        }
    }

    /// Size used for rate-limit cost
    pub fn byte_len(&self) -> usize {
        self.text.len()
    }
}

/// A unit of outbound work owned by the queue, then by the sender
#[derive(Debug, Clone)]
pub struct Sendable {
    /// Queue key; time ordered
    pub id: String,
    pub kind: SendableKind,
    pub payload: Payload,
    pub recipients: Vec<Recipient>,
    /// Fan-out to many recipients; only batches check for priority preemption
    pub is_batch: bool,
    /// Events this notification concerns
    pub event_ids: Vec<String>,
    pub class: Option<NotificationClass>,
    /// NET rendered into `{local_time}`
    pub net: Option<i64>,
    /// Delivered messages; for Delete, the messages to remove
    pub message_ids: Vec<SentMessage>,
    /// Rate-limit tokens per recipient send
    pub token_cost: u32,
    pub priority: bool,
}

impl Sendable {
    fn base(kind: SendableKind, payload: Payload, recipients: Vec<Recipient>) -> Self {
        let is_batch = recipients.len() > 1;
        Self {
            id: Uuid::now_v7().to_string(),
            kind,
            payload,
            recipients,
            is_batch,
            event_ids: Vec::new(),
            class: None,
            net: None,
            message_ids: Vec::new(),
            token_cost: 1,
            priority: false,
        }
    }

    /// A launch notification (or postponement when `class` is None)
    pub fn notification(
        event_id: impl Into<String>,
        class: Option<NotificationClass>,
        net: i64,
        payload: Payload,
        recipients: Vec<Recipient>,
    ) -> Self {
        let mut sendable = Self::base(SendableKind::Notification, payload, recipients);
        sendable.event_ids.push(event_id.into());
        sendable.class = class;
        sendable.net = Some(net);
        sendable
    }

    /// A reply or alert to a single recipient
    pub fn command(recipient: Recipient, payload: Payload) -> Self {
        Self::base(SendableKind::Command, payload, vec![recipient])
    }

    /// Deletion of previously delivered messages
    pub fn delete(targets: Vec<SentMessage>) -> Self {
        let mut recipients: Vec<Recipient> = Vec::new();
        for target in &targets {
            if !recipients.iter().any(|r| r.id == target.recipient) {
                recipients.push(Recipient::new(target.recipient.clone()));
            }
        }
        let mut sendable = Self::base(SendableKind::Delete, Payload::default(), recipients);
        // Deletes iterate message ids, so the batch flag follows them
        sendable.is_batch = targets.len() > 1;
        sendable.message_ids = targets;
        sendable
    }

    /// Payload text customised for one recipient
    pub fn render_for(&self, recipient: &Recipient) -> String {
        let text = &self.payload.text;
        match self.net {
            Some(net) if text.contains(LOCAL_TIME_PLACEHOLDER) => {
                text.replace(LOCAL_TIME_PLACEHOLDER, &format_local_time(net, recipient.utc_offset))
            }
            _ => text.clone(),
        }
    }

    /// Record a successful delivery
    pub fn record_sent(&mut self, recipient: &str, message_id: impl Into<String>) {
        self.message_ids.push(SentMessage::new(recipient, message_id));
    }
}

/// Render a Unix timestamp at a fixed UTC offset, e.g. "14:05 UTC+02:00 (Mar 3)"
pub fn format_local_time(unix: i64, utc_offset: i32) -> String {
    // Out-of-range offsets fall back to UTC
    let offset = FixedOffset::east_opt(utc_offset).or_else(|| FixedOffset::east_opt(0));
    let (Some(utc), Some(offset)) = (DateTime::from_timestamp(unix, 0), offset) else {
        return unix.to_string();
    };
    let local = utc.with_timezone(&offset);
    format!("{} UTC{} ({})", local.format("%H:%M"), local.format("%:z"), local.format("%b %-d"))
}
