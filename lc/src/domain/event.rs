//! Tracked events, recipients and sent-message references

use serde::{Deserialize, Serialize};

use super::class::{ClassSet, NotificationClass};

/// A tracked launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Upstream identifier, stable across refreshes
    pub id: String,

    /// Display name used in messages
    pub name: String,

    /// NET (no earlier than) as Unix seconds
    pub net: i64,

    /// Only confirmed events are scheduled
    #[serde(default)]
    pub live: bool,

    /// Launched or failed; dropped from tracking on the next refresh
    #[serde(default)]
    pub concluded: bool,

    /// Classes already delivered for the current NET
    #[serde(default)]
    pub sent: ClassSet,

    /// Messages delivered for the most recent notification, deleted when superseded
    #[serde(default)]
    pub sent_ids: Vec<SentMessage>,

    /// Total successful per-recipient deliveries for this event
    #[serde(default)]
    pub delivered: u64,
}

impl Event {
    /// Create a live event with no notification state
    pub fn new(id: impl Into<String>, name: impl Into<String>, net: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            net,
            live: true,
            concluded: false,
            sent: ClassSet::empty(),
            sent_ids: Vec::new(),
            delivered: 0,
        }
    }

    pub fn is_sent(&self, class: NotificationClass) -> bool {
        self.sent.contains(class)
    }

    /// Carry notification state from the previously tracked copy of this event
    pub fn inherit_state(&mut self, previous: &Event) {
        self.sent = previous.sent;
        self.sent_ids = previous.sent_ids.clone();
        self.delivered = previous.delivered;
    }
}

/// A message destination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    /// Transport chat identifier
    pub id: String,

    /// Offset from UTC in seconds, used for local time rendering
    #[serde(default)]
    pub utc_offset: i32,
}

impl Recipient {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            utc_offset: 0,
        }
    }

    pub fn with_offset(id: impl Into<String>, utc_offset: i32) -> Self {
        Self {
            id: id.into(),
            utc_offset,
        }
    }
}

/// A delivered message, persisted as `"{recipient}:{message_id}"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SentMessage {
    pub recipient: String,
    pub message_id: String,
}

impl SentMessage {
    pub fn new(recipient: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            message_id: message_id.into(),
        }
    }
}

impl std::fmt::Display for SentMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.recipient, self.message_id)
    }
}

impl std::str::FromStr for SentMessage {
    type Err = String;

    // Chat ids may be negative but never contain ':', so split on the last one
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once(':') {
            Some((recipient, message_id)) if !recipient.is_empty() && !message_id.is_empty() => {
                Ok(Self::new(recipient, message_id))
            }
            _ => Err(format!("Invalid sent message reference: {}", s)),
        }
    }
}

impl Serialize for SentMessage {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SentMessage {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_event_is_live_and_unsent() {
        let event = Event::new("abc", "Falcon 9 | Starlink", 1_700_000_000);
        assert!(event.live);
        assert!(!event.concluded);
        assert!(event.sent.is_empty());
        assert!(event.sent_ids.is_empty());
    }

    #[test]
    fn test_inherit_state() {
        let mut old = Event::new("abc", "Old name", 100);
        old.sent.insert(NotificationClass::T24h);
        old.sent_ids.push(SentMessage::new("42", "7"));
        old.delivered = 3;

        let mut fresh = Event::new("abc", "New name", 200);
        fresh.inherit_state(&old);

        assert!(fresh.is_sent(NotificationClass::T24h));
        assert_eq!(fresh.sent_ids, old.sent_ids);
        assert_eq!(fresh.delivered, 3);
        assert_eq!(fresh.name, "New name");
        assert_eq!(fresh.net, 200);
    }

    #[test]
    fn test_sent_message_format_and_parse() {
        let msg = SentMessage::new("-100123", "55");
        assert_eq!(msg.to_string(), "-100123:55");
        assert_eq!("-100123:55".parse::<SentMessage>().unwrap(), msg);
        assert!("no-separator".parse::<SentMessage>().is_err());
        assert!(":5".parse::<SentMessage>().is_err());
    }

    #[test]
    fn test_event_deserialize_defaults() {
        let json = r#"{"id":"x","name":"Electron","net":10,"sent":["1h"],"sent_ids":["9:1"]}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert!(!event.live);
        assert!(event.is_sent(NotificationClass::T1h));
        assert_eq!(event.sent_ids, vec![SentMessage::new("9", "1")]);
    }
}
