//! NET slip detection

use tracing::{debug, info};

use crate::domain::{ClassSet, ClassTable, Event};

use super::config::SchedulerConfig;

/// Result of applying a new NET to an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlipOutcome {
    /// The NET differs from the previous one
    pub changed: bool,
    /// Sent classes whose window re-opened and were cleared
    pub reset: ClassSet,
}

impl SlipOutcome {
    /// A postponement notice is warranted
    pub fn needs_postponement(&self) -> bool {
        self.changed && !self.reset.is_empty()
    }
}

/// Apply `new_net` to `event`, clearing sent flags whose window re-opened
///
/// A window re-opens when its new send time lies beyond `now` plus the slip
/// tolerance, so a slip of a few minutes never repeats a notification. Classes
/// are checked in scan order. Callers must hold the lock that guards `event`.
pub fn detect_slip(
    event: &mut Event,
    new_net: i64,
    table: &ClassTable,
    config: &SchedulerConfig,
    now: i64,
) -> SlipOutcome {
    debug!(event_id = %event.id, old_net = event.net, new_net, "detect_slip: called");
    if event.net == new_net {
        return SlipOutcome::default();
    }

    let mut reset = ClassSet::empty();
    for spec in table.iter() {
        if !event.sent.contains(spec.class) {
            continue;
        }
        let send_time = new_net - spec.lead_secs;
        if send_time > now + config.slip_tolerance_secs {
            event.sent.remove(spec.class);
            reset.insert(spec.class);
        }
    }

    if !reset.is_empty() {
        info!(
            event_id = %event.id,
            old_net = event.net,
            new_net,
            reset = ?reset.iter().collect::<Vec<_>>(),
            "NET slipped, notification windows re-opened"
        );
    }

    event.net = new_net;
    SlipOutcome { changed: true, reset }
}
