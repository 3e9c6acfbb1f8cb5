use crate::domain::models::{Alarm, AlarmKey, NormalizedEvent, ReconcilePlan, ScheduledAction};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

pub fn plan_alarms(
    now: DateTime<Utc>,
    offset_minutes: i64,
    events: &[NormalizedEvent],
    existing: &[Alarm],
) -> ReconcilePlan {
    let to_clear: Vec<AlarmKey> = existing
        .iter()
        .filter(|alarm| !alarm.key.is_recurring_trigger())
        .map(|alarm| alarm.key.clone())
        .collect();

    let mut by_key: HashMap<AlarmKey, (usize, ScheduledAction)> = HashMap::new();
    for (position, event) in events.iter().enumerate() {
        let Some(meeting_url) = event.meeting_url.as_ref() else {
            continue;
        };
        let Some(open_time) = open_time(event.start, offset_minutes) else {
            tracing::warn!(
                summary = event.summary.as_deref().unwrap_or("(untitled)"),
                offset_minutes,
                "open time out of range; skipping event"
            );
            continue;
        };
        if open_time <= now {
            continue;
        }
        let action = ScheduledAction {
            meeting_url: meeting_url.clone(),
            fires_at: open_time,
        };
        by_key.insert(action.key(), (position, action));
    }

    let mut scheduled: Vec<(usize, ScheduledAction)> = by_key.into_values().collect();
    scheduled.sort_by_key(|(position, _)| *position);

    ReconcilePlan {
        to_schedule: scheduled.into_iter().map(|(_, action)| action).collect(),
        to_clear,
        considered: events.len(),
    }
}

fn open_time(start: DateTime<Utc>, offset_minutes: i64) -> Option<DateTime<Utc>> {
    let offset = Duration::try_minutes(offset_minutes)?;
    start.checked_sub_signed(offset)
}
