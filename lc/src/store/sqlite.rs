//! SQLite store

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use super::{Store, StoreError, Subscriber, SubscriberLookup};
use crate::domain::{ClassSet, Event, NotificationClass, Recipient, SentMessage};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    net INTEGER NOT NULL,
    live INTEGER NOT NULL DEFAULT 0,
    concluded INTEGER NOT NULL DEFAULT 0,
    sent INTEGER NOT NULL DEFAULT 0,
    sent_ids TEXT NOT NULL DEFAULT '[]',
    delivered INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS subscribers (
    chat_id TEXT PRIMARY KEY,
    utc_offset INTEGER NOT NULL DEFAULT 0,
    classes INTEGER NOT NULL DEFAULT 15,
    keywords TEXT NOT NULL DEFAULT '[]'
);
";

/// Events and subscribers in a single SQLite file
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        debug!(?path, "SqliteStore::open: called");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        info!(?path, "Opened store");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Empty throwaway database
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory copy of every event and subscriber
    ///
    /// Dry runs work on the copy, so nothing they mark sent reaches the file.
    pub fn scratch_copy(&self) -> Result<Self, StoreError> {
        debug!("SqliteStore::scratch_copy: called");
        let copy = Self::in_memory()?;
        for event in self.load_events()? {
            copy.upsert_event(&event)?;
        }
        for subscriber in self.subscribers()? {
            copy.upsert_subscriber(&subscriber)?;
        }
        Ok(copy)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Insert or replace an event row, including its notification state
    pub fn upsert_event(&self, event: &Event) -> Result<(), StoreError> {
        debug!(event_id = %event.id, "SqliteStore::upsert_event: called");
        let sent_ids = serde_json::to_string(&event.sent_ids)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO events (id, name, net, live, concluded, sent, sent_ids, delivered)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.id,
                event.name,
                event.net,
                event.live,
                event.concluded,
                event.sent.bits(),
                sent_ids,
                event.delivered as i64,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_subscriber(&self, subscriber: &Subscriber) -> Result<(), StoreError> {
        debug!(recipient = %subscriber.recipient.id, "SqliteStore::upsert_subscriber: called");
        let keywords = serde_json::to_string(&subscriber.keywords)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO subscribers (chat_id, utc_offset, classes, keywords) VALUES (?1, ?2, ?3, ?4)",
            params![
                subscriber.recipient.id,
                subscriber.recipient.utc_offset,
                subscriber.classes.bits(),
                keywords,
            ],
        )?;
        Ok(())
    }

    pub fn event(&self, id: &str) -> Result<Option<Event>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, name, net, live, concluded, sent, sent_ids, delivered FROM events WHERE id = ?1",
                params![id],
                read_event_row,
            )
            .optional()?;
        row.map(EventRow::into_event).transpose()
    }

    /// Every event row, soonest NET first
    fn load_events(&self) -> Result<Vec<Event>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, net, live, concluded, sent, sent_ids, delivered FROM events ORDER BY net, id",
        )?;
        let rows = stmt.query_map([], read_event_row)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event()?);
        }
        Ok(events)
    }

    pub fn subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT chat_id, utc_offset, classes, keywords FROM subscribers ORDER BY chat_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i32>(1)?,
                row.get::<_, u8>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut subscribers = Vec::new();
        for row in rows {
            let (chat_id, utc_offset, classes, keywords) = row?;
            subscribers.push(Subscriber {
                recipient: Recipient::with_offset(chat_id, utc_offset),
                classes: ClassSet::from_bits(classes),
                keywords: serde_json::from_str(&keywords)?,
            });
        }
        Ok(subscribers)
    }
}

/// Raw column values of an events row
struct EventRow {
    id: String,
    name: String,
    net: i64,
    live: bool,
    concluded: bool,
    sent: u8,
    sent_ids: String,
    delivered: i64,
}

impl EventRow {
    fn into_event(self) -> Result<Event, StoreError> {
        let sent_ids: Vec<SentMessage> = serde_json::from_str(&self.sent_ids)?;
        Ok(Event {
            id: self.id,
            name: self.name,
            net: self.net,
            live: self.live,
            concluded: self.concluded,
            sent: ClassSet::from_bits(self.sent),
            sent_ids,
            delivered: self.delivered.max(0) as u64,
        })
    }
}

fn read_event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: row.get(0)?,
        name: row.get(1)?,
        net: row.get(2)?,
        live: row.get(3)?,
        concluded: row.get(4)?,
        sent: row.get(5)?,
        sent_ids: row.get(6)?,
        delivered: row.get(7)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn refresh(&self) -> Result<Vec<Event>, StoreError> {
        debug!("SqliteStore::refresh: called");
        self.load_events()
    }

    async fn persist_notification_state(&self, event: &Event) -> Result<(), StoreError> {
        debug!(event_id = %event.id, "SqliteStore::persist_notification_state: called");
        let updated = self.conn()?.execute(
            "UPDATE events SET sent = ?2, delivered = ?3 WHERE id = ?1",
            params![event.id, event.sent.bits(), event.delivered as i64],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(event.id.clone()));
        }
        Ok(())
    }

    async fn persist_sent_ids(&self, event_id: &str, ids: &[SentMessage]) -> Result<(), StoreError> {
        debug!(%event_id, count = ids.len(), "SqliteStore::persist_sent_ids: called");
        let encoded = serde_json::to_string(ids)?;
        let updated = self.conn()?.execute(
            "UPDATE events SET sent_ids = ?2 WHERE id = ?1",
            params![event_id, encoded],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(event_id.to_string()));
        }
        Ok(())
    }

    async fn remove_subscriber(&self, recipient: &str) -> Result<(), StoreError> {
        debug!(%recipient, "SqliteStore::remove_subscriber: called");
        self.conn()?
            .execute("DELETE FROM subscribers WHERE chat_id = ?1", params![recipient])?;
        Ok(())
    }
}

#[async_trait]
impl SubscriberLookup for SqliteStore {
    async fn recipients(&self, event_id: &str, class: NotificationClass) -> Result<Vec<Recipient>, StoreError> {
        debug!(%event_id, %class, "SqliteStore::recipients: called");
        let name: String = {
            let conn = self.conn()?;
            conn.query_row("SELECT name FROM events WHERE id = ?1", params![event_id], |row| row.get(0))
                .optional()?
                .ok_or_else(|| StoreError::NotFound(event_id.to_string()))?
        };

        Ok(self
            .subscribers()?
            .into_iter()
            .filter(|s| s.wants(&name, class))
            .map(|s| s.recipient)
            .collect())
    }
}
