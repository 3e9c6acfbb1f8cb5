use crate::domain::models::{validate_meeting_url, NormalizedEvent};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use url::Url;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventStart {
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct GoogleCalendarEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "hangoutLink", default, skip_serializing_if = "Option::is_none")]
    pub hangout_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<CalendarEventStart>,
}

impl GoogleCalendarEvent {
    fn label(&self) -> &str {
        self.summary
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("(untitled)")
    }
}

pub fn normalize_events(events: &[GoogleCalendarEvent]) -> Vec<NormalizedEvent> {
    events
        .iter()
        .filter_map(|event| match normalize_event(event) {
            Ok(normalized) => Some(normalized),
            Err(error) => {
                tracing::warn!(event = event.label(), %error, "skipping calendar event");
                None
            }
        })
        .collect()
}

pub fn normalize_event(event: &GoogleCalendarEvent) -> Result<NormalizedEvent, InfraError> {
    let start = event
        .start
        .as_ref()
        .ok_or_else(|| InfraError::InvalidEvent("event has no start".to_string()))?;
    let start_instant = parse_start(start)?;

    let meeting_url = event
        .hangout_link
        .as_deref()
        .map(str::trim)
        .filter(|link| !link.is_empty())
        .and_then(|link| match parse_meeting_url(link) {
            Ok(url) => Some(url),
            Err(error) => {
                tracing::warn!(event = event.label(), %error, "ignoring meeting link");
                None
            }
        });

    if meeting_url.is_some() {
        tracing::debug!(
            event = event.label(),
            local_start = %local_start_display(start_instant, start.time_zone.as_deref()),
            "Accepted future event found"
        );
    }

    Ok(NormalizedEvent {
        start: start_instant,
        meeting_url,
        summary: event.summary.clone(),
    })
}

pub fn parse_start(start: &CalendarEventStart) -> Result<DateTime<Utc>, InfraError> {
    if let Some(value) = start.date_time.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        return DateTime::parse_from_rfc3339(value)
            .map(|value| value.with_timezone(&Utc))
            .map_err(|error| {
                InfraError::InvalidEvent(format!("invalid start.dateTime '{value}': {error}"))
            });
    }
    if let Some(value) = start.date.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|error| {
            InfraError::InvalidEvent(format!("invalid start.date '{value}': {error}"))
        })?;
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    Err(InfraError::InvalidEvent(
        "event start has neither dateTime nor date".to_string(),
    ))
}

pub fn parse_meeting_url(raw: &str) -> Result<Url, InfraError> {
    let url = Url::parse(raw)
        .map_err(|error| InfraError::InvalidEvent(format!("invalid meeting url '{raw}': {error}")))?;
    validate_meeting_url(&url).map_err(InfraError::InvalidEvent)?;
    Ok(url)
}

pub fn local_start_display(start: DateTime<Utc>, time_zone: Option<&str>) -> String {
    match time_zone.and_then(|zone| zone.parse::<Tz>().ok()) {
        Some(zone) => start.with_timezone(&zone).format("%Y-%m-%d %H:%M:%S %Z").to_string(),
        None => start.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn event(summary: &str, link: Option<&str>, start: CalendarEventStart) -> GoogleCalendarEvent {
        GoogleCalendarEvent {
            id: Some(format!("evt-{summary}")),
            summary: Some(summary.to_string()),
            status: Some("confirmed".to_string()),
            hangout_link: link.map(ToOwned::to_owned),
            start: Some(start),
        }
    }

    fn timed(value: &str) -> CalendarEventStart {
        CalendarEventStart {
            date_time: Some(value.to_string()),
            date: None,
            time_zone: Some("Asia/Tokyo".to_string()),
        }
    }

    #[test]
    fn date_time_is_converted_to_utc_instant() {
        let normalized = normalize_event(&event(
            "Standup",
            Some("https://meet.google.com/abc-defg-hij"),
            timed("2026-02-16T10:00:00+09:00"),
        ))
        .expect("normalize");

        assert_eq!(normalized.start, fixed_time("2026-02-16T01:00:00Z"));
        assert_eq!(
            normalized.meeting_url.map(|url| url.to_string()),
            Some("https://meet.google.com/abc-defg-hij".to_string())
        );
    }

    #[test]
    fn date_only_start_resolves_to_midnight_utc() {
        let start = CalendarEventStart {
            date_time: None,
            date: Some("2026-02-17".to_string()),
            time_zone: None,
        };
        assert_eq!(parse_start(&start).expect("parse"), fixed_time("2026-02-17T00:00:00Z"));
    }

    #[test]
    fn date_time_takes_precedence_over_date() {
        let start = CalendarEventStart {
            date_time: Some("2026-02-17T08:30:00Z".to_string()),
            date: Some("2026-02-20".to_string()),
            time_zone: None,
        };
        assert_eq!(parse_start(&start).expect("parse"), fixed_time("2026-02-17T08:30:00Z"));
    }

    #[test]
    fn malformed_start_drops_only_that_event() {
        let events = vec![
            event("broken", Some("https://meet.google.com/a"), timed("yesterday-ish")),
            GoogleCalendarEvent {
                start: None,
                ..event("no-start", Some("https://meet.google.com/b"), timed("2026-02-16T10:00:00Z"))
            },
            event("good", Some("https://meet.google.com/c"), timed("2026-02-16T10:00:00Z")),
        ];

        let normalized = normalize_events(&events);

        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].summary.as_deref(), Some("good"));
    }

    #[test]
    fn malformed_upstream_data_is_an_event_error() {
        let no_start = GoogleCalendarEvent {
            start: None,
            ..event("no-start", None, timed("2026-02-16T10:00:00Z"))
        };

        assert!(matches!(
            normalize_event(&no_start),
            Err(InfraError::InvalidEvent(message)) if message.contains("no start")
        ));
        assert!(matches!(
            normalize_event(&event("broken", None, timed("yesterday-ish"))),
            Err(InfraError::InvalidEvent(_))
        ));
        assert!(matches!(
            parse_meeting_url("ftp://meet.google.com/abc"),
            Err(InfraError::InvalidEvent(_))
        ));
    }

    #[test]
    fn events_without_or_with_unusable_links_keep_their_start() {
        let events = vec![
            event("lunch", None, timed("2026-02-16T12:00:00Z")),
            event("odd", Some("not a url"), timed("2026-02-16T13:00:00Z")),
            event("blank", Some("   "), timed("2026-02-16T14:00:00Z")),
        ];

        let normalized = normalize_events(&events);

        assert_eq!(normalized.len(), 3);
        assert!(normalized.iter().all(|event| event.meeting_url.is_none()));
    }

    #[test]
    fn raw_event_decodes_from_calendar_payload() {
        let payload = serde_json::json!({
            "id": "evt-1",
            "summary": "Design review",
            "hangoutLink": "https://meet.google.com/xyz",
            "start": { "dateTime": "2026-02-16T10:00:00Z", "timeZone": "Europe/Berlin" },
            "end": { "dateTime": "2026-02-16T11:00:00Z" }
        });
        let decoded: GoogleCalendarEvent = serde_json::from_value(payload).expect("decode");
        assert_eq!(decoded.hangout_link.as_deref(), Some("https://meet.google.com/xyz"));
        assert_eq!(
            decoded.start.and_then(|start| start.time_zone).as_deref(),
            Some("Europe/Berlin")
        );
    }

    #[test]
    fn local_display_uses_event_zone() {
        let start = fixed_time("2026-02-16T01:00:00Z");
        assert_eq!(
            local_start_display(start, Some("Asia/Tokyo")),
            "2026-02-16 10:00:00 JST"
        );
        assert_eq!(
            local_start_display(start, Some("Not/AZone")),
            "2026-02-16 01:00:00 UTC"
        );
    }
}
