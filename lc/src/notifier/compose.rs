//! Message text

use crate::domain::{Event, LOCAL_TIME_PLACEHOLDER, NotificationClass, Payload, SendOptions};

/// Text for a launch notification; NET is rendered per recipient
pub fn notification_payload(event: &Event, class: NotificationClass) -> Payload {
    let headline = match class {
        NotificationClass::T5m => format!("🚀 Launching in {}!", class.lead_label()),
        _ => format!("🚀 Launching in {}", class.lead_label()),
    };
    Payload {
        text: format!("{}\n{}\nNET: {}", headline, event.name, LOCAL_TIME_PLACEHOLDER),
        options: SendOptions {
            parse_mode: None,
            silent: !class.is_urgent(),
            disable_preview: true,
        },
    }
}

/// Text announcing that an event moved from `old_net` to its current NET
pub fn postponement_payload(event: &Event, old_net: i64) -> Payload {
    let delta = event.net - old_net;
    let moved = if delta >= 0 {
        format!("was postponed by {}", format_delay(delta))
    } else {
        format!("moved earlier by {}", format_delay(-delta))
    };
    Payload {
        text: format!("⏸ {} {}\nNew NET: {}", event.name, moved, LOCAL_TIME_PLACEHOLDER),
        options: SendOptions {
            parse_mode: None,
            silent: true,
            disable_preview: true,
        },
    }
}

/// Admin alert sent when the daemon starts
pub fn startup_payload(tracked: usize, dry_run: bool) -> Payload {
    let mode = if dry_run { "dry run" } else { "live" };
    Payload::text(format!(
        "launchcast {} started ({})\nTracking {} events",
        env!("CARGO_PKG_VERSION"),
        mode,
        tracked
    ))
}

/// "3d 4h", "2h 15m", "45m", "0m"
pub fn format_delay(secs: i64) -> String {
    let secs = secs.max(0);
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;

    match (days, hours, minutes) {
        (0, 0, m) => format!("{}m", m),
        (0, h, 0) => format!("{}h", h),
        (0, h, m) => format!("{}h {}m", h, m),
        (d, 0, _) => format!("{}d", d),
        (d, h, _) => format!("{}d {}h", d, h),
    }
}
