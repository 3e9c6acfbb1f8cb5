use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

pub const CHECK_CALENDAR_ALARM: &str = "checkCalendar";
pub const OPEN_TAB_PREFIX: &str = "openTab_";
pub const CHECK_CALENDAR_PERIOD_MINUTES: u32 = 10;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct TimeOffset(i32);

impl TimeOffset {
    pub const MIN: i32 = -5;
    pub const MAX: i32 = 5;

    pub fn new(minutes: i32) -> Result<Self, String> {
        if !(Self::MIN..=Self::MAX).contains(&minutes) {
            return Err(format!(
                "time offset must be between {} and {} minutes, got {minutes}",
                Self::MIN,
                Self::MAX
            ));
        }
        Ok(Self(minutes))
    }

    pub fn clamped(minutes: i64) -> Self {
        Self(minutes.clamp(i64::from(Self::MIN), i64::from(Self::MAX)) as i32)
    }

    pub fn from_slider(slider_value: i32) -> Result<Self, String> {
        Self::new(slider_value.checked_neg().unwrap_or(i32::MAX))
    }

    pub fn minutes(self) -> i32 {
        self.0
    }

    pub fn slider_value(self) -> i32 {
        -self.0
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            3..=5 => "early reminder",
            -2..=2 => "sweet spot",
            _ => "late reminder",
        }
    }

    pub fn direction(self) -> String {
        let side = if self.0 >= 0 { "before" } else { "after" };
        format!("{} minutes {side}", self.0.unsigned_abs())
    }

    pub fn describe(self) -> String {
        match self.0 {
            0 => "Your meeting will open at the scheduled time.".to_string(),
            value if value > 0 => {
                format!("Your meeting will open {value} minutes before the scheduled time.")
            }
            value => format!(
                "Your meeting will open {} minutes after the scheduled time.",
                value.unsigned_abs()
            ),
        }
    }
}

impl fmt::Display for TimeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub token_type: String,
    pub scope: Option<String>,
}

impl OAuthToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        self.expires_at > now + chrono::Duration::seconds(leeway_seconds)
            && !self.access_token.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlarmKey {
    CheckCalendar,
    OpenMeeting { url: Url },
}

impl AlarmKey {
    pub fn is_recurring_trigger(&self) -> bool {
        matches!(self, Self::CheckCalendar)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::CheckCalendar => "check_calendar",
            Self::OpenMeeting { .. } => "open_meeting",
        }
    }

    pub fn meeting_url(&self) -> Option<&Url> {
        match self {
            Self::CheckCalendar => None,
            Self::OpenMeeting { url } => Some(url),
        }
    }
}

impl fmt::Display for AlarmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckCalendar => f.write_str(CHECK_CALENDAR_ALARM),
            Self::OpenMeeting { url } => write!(f, "{OPEN_TAB_PREFIX}{url}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub key: AlarmKey,
    pub scheduled_time: DateTime<Utc>,
    pub period_minutes: Option<u32>,
}

impl Alarm {
    pub fn check_calendar(now: DateTime<Utc>) -> Self {
        let period = CHECK_CALENDAR_PERIOD_MINUTES;
        Self {
            key: AlarmKey::CheckCalendar,
            scheduled_time: now + chrono::Duration::minutes(i64::from(period)),
            period_minutes: Some(period),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.period_minutes == Some(0) {
            return Err(format!("alarm {} has a zero period", self.key));
        }
        if let Some(url) = self.key.meeting_url() {
            validate_meeting_url(url)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub start: DateTime<Utc>,
    pub meeting_url: Option<Url>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledAction {
    pub meeting_url: Url,
    pub fires_at: DateTime<Utc>,
}

impl ScheduledAction {
    pub fn key(&self) -> AlarmKey {
        AlarmKey::OpenMeeting {
            url: self.meeting_url.clone(),
        }
    }

    pub fn to_alarm(&self) -> Alarm {
        Alarm {
            key: self.key(),
            scheduled_time: self.fires_at,
            period_minutes: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_schedule: Vec<ScheduledAction>,
    pub to_clear: Vec<AlarmKey>,
    pub considered: usize,
}

pub fn validate_meeting_url(url: &Url) -> Result<(), String> {
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(()),
        "http" | "https" => Err(format!("meeting url '{url}' has no host")),
        other => Err(format!("meeting url '{url}' uses unsupported scheme '{other}'")),
    }
}
