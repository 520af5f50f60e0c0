//! Next-due notification search

use tracing::{debug, warn};

use crate::domain::{ClassTable, Event, NotificationClass};

use super::config::SchedulerConfig;

/// One event's contribution to a due notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueEntry {
    pub event_id: String,
    /// The class due for this particular event
    pub class: NotificationClass,
}

/// The next notification to send, possibly shared by several events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueNotification {
    /// Highest-weighted class among the entries
    pub class: NotificationClass,
    /// Unix seconds
    pub send_time: i64,
    /// Members in event id order
    pub entries: Vec<DueEntry>,
}

impl DueNotification {
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn event_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.event_id.as_str())
    }

    pub fn is_due(&self, now: i64) -> bool {
        self.send_time <= now
    }
}

/// A class marked sent without notifying because it was too late
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedClass {
    pub event_id: String,
    pub class: NotificationClass,
    /// Seconds past the send time when the scan ran
    pub late_by: i64,
}

/// Result of a scan over the tracked events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// None when nothing is due within the horizon
    pub due: Option<DueNotification>,
    /// State changes made during the scan that still need persisting
    pub skipped: Vec<SkippedClass>,
}

/// Find the next due notification across `events`
///
/// Classes missed by more than the slip tolerance are marked sent on the
/// events themselves and reported in [`ScanOutcome::skipped`]. Nothing else
/// about the events is changed.
pub fn find_next<'a>(
    events: impl IntoIterator<Item = &'a mut Event>,
    table: &ClassTable,
    config: &SchedulerConfig,
    now: i64,
) -> ScanOutcome {
    debug!(now, "find_next: called");
    let mut skipped = Vec::new();
    let mut best: Option<(i64, Vec<DueEntry>)> = None;

    for event in events {
        if !event.live || event.concluded {
            continue;
        }

        let Some((class, send_time)) = next_for_event(event, table, config, now, &mut skipped) else {
            continue;
        };

        if send_time - now > config.horizon_secs {
            debug!(event_id = %event.id, %class, send_time, "find_next: beyond horizon");
            continue;
        }

        let entry = DueEntry {
            event_id: event.id.clone(),
            class,
        };

        match best.as_mut() {
            Some((best_time, entries)) if send_time == *best_time => entries.push(entry),
            Some((best_time, _)) if send_time > *best_time => {}
            Some(slot) => *slot = (send_time, vec![entry]),
            None => best = Some((send_time, vec![entry])),
        }
    }

    let due = best.and_then(|(send_time, entries)| {
        let class = entries.iter().map(|e| e.class).max_by_key(|c| table.weight(*c))?;
        Some(DueNotification {
            class,
            send_time,
            entries,
        })
    });

    if let Some(due) = &due {
        debug!(class = %due.class, send_time = due.send_time, count = due.count(), "find_next: found");
    } else {
        debug!("find_next: nothing due");
    }

    ScanOutcome { due, skipped }
}

/// First unsent class for one event and its effective send time
fn next_for_event(
    event: &mut Event,
    table: &ClassTable,
    config: &SchedulerConfig,
    now: i64,
    skipped: &mut Vec<SkippedClass>,
) -> Option<(NotificationClass, i64)> {
    for spec in table.iter() {
        if event.sent.contains(spec.class) {
            continue;
        }

        let send_time = event.net - spec.lead_secs;
        if send_time >= now {
            return Some((spec.class, send_time));
        }

        let late_by = now - send_time;
        if late_by <= config.slip_tolerance_secs {
            debug!(event_id = %event.id, class = %spec.class, late_by, "next_for_event: slightly late, rescheduling");
            return Some((spec.class, now + config.reschedule_delay_secs));
        }

        warn!(
            event_id = %event.id,
            class = %spec.class,
            late_by,
            "Notification window missed beyond tolerance, marking sent without notifying"
        );
        event.sent.insert(spec.class);
        skipped.push(SkippedClass {
            event_id: event.id.clone(),
            class: spec.class,
            late_by,
        });
    }

    None
}
