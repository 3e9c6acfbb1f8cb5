use crate::domain::models::{Alarm, AlarmKey};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, Transaction};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use url::Url;

const KIND_CHECK_CALENDAR: &str = "check_calendar";
const KIND_OPEN_MEETING: &str = "open_meeting";

pub trait AlarmStore: Send + Sync {
    fn get_all(&self) -> Result<Vec<Alarm>, InfraError>;
    fn create(&self, alarm: &Alarm) -> Result<(), InfraError>;
    fn clear(&self, key: &AlarmKey) -> Result<bool, InfraError>;
    fn replace(&self, to_clear: &[AlarmKey], to_create: &[Alarm]) -> Result<(), InfraError>;
    fn next_fire_time(&self) -> Result<Option<DateTime<Utc>>, InfraError>;
    fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<Alarm>, InfraError>;
}

fn next_periodic_time(alarm: &Alarm, period_minutes: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    let period = Duration::minutes(i64::from(period_minutes));
    let next = alarm.scheduled_time + period;
    if next > now { next } else { now + period }
}

fn validate_all(alarms: &[Alarm]) -> Result<(), InfraError> {
    for alarm in alarms {
        alarm.validate().map_err(InfraError::Scheduling)?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SqliteAlarmStore {
    db_path: PathBuf,
}

impl SqliteAlarmStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(scheduling_error)
    }
}

fn scheduling_error(error: rusqlite::Error) -> InfraError {
    InfraError::Scheduling(error.to_string())
}

fn key_columns(key: &AlarmKey) -> (&'static str, String) {
    match key {
        AlarmKey::CheckCalendar => (KIND_CHECK_CALENDAR, String::new()),
        AlarmKey::OpenMeeting { url } => (KIND_OPEN_MEETING, url.to_string()),
    }
}

fn alarm_from_row(
    kind: String,
    url: String,
    scheduled_at_ms: i64,
    period_minutes: Option<u32>,
) -> Result<Alarm, InfraError> {
    let key = match kind.as_str() {
        KIND_CHECK_CALENDAR => AlarmKey::CheckCalendar,
        KIND_OPEN_MEETING => AlarmKey::OpenMeeting {
            url: Url::parse(&url).map_err(|error| {
                InfraError::Scheduling(format!("stored alarm has invalid url '{url}': {error}"))
            })?,
        },
        other => {
            return Err(InfraError::Scheduling(format!("unknown stored alarm kind '{other}'")));
        }
    };
    let scheduled_time = DateTime::from_timestamp_millis(scheduled_at_ms).ok_or_else(|| {
        InfraError::Scheduling(format!("stored alarm time {scheduled_at_ms} is out of range"))
    })?;
    Ok(Alarm {
        key,
        scheduled_time,
        period_minutes,
    })
}

fn load_all(connection: &Connection) -> Result<Vec<Alarm>, InfraError> {
    let mut statement = connection
        .prepare(
            "SELECT kind, url, scheduled_at_ms, period_minutes FROM alarms
             ORDER BY scheduled_at_ms, kind, url",
        )
        .map_err(scheduling_error)?;
    let rows = statement
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<u32>>(3)?,
            ))
        })
        .map_err(scheduling_error)?;

    let mut alarms = Vec::new();
    for row in rows {
        let (kind, url, scheduled_at_ms, period_minutes) = row.map_err(scheduling_error)?;
        alarms.push(alarm_from_row(kind, url, scheduled_at_ms, period_minutes)?);
    }
    Ok(alarms)
}

fn upsert(transaction: &Transaction<'_>, alarm: &Alarm) -> Result<(), InfraError> {
    let (kind, url) = key_columns(&alarm.key);
    transaction
        .execute(
            "INSERT INTO alarms (kind, url, scheduled_at_ms, period_minutes)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(kind, url) DO UPDATE SET
               scheduled_at_ms = excluded.scheduled_at_ms,
               period_minutes = excluded.period_minutes",
            params![
                kind,
                url,
                alarm.scheduled_time.timestamp_millis(),
                alarm.period_minutes
            ],
        )
        .map_err(scheduling_error)?;
    Ok(())
}

fn delete(transaction: &Transaction<'_>, key: &AlarmKey) -> Result<bool, InfraError> {
    let (kind, url) = key_columns(key);
    let removed = transaction
        .execute(
            "DELETE FROM alarms WHERE kind = ?1 AND url = ?2",
            params![kind, url],
        )
        .map_err(scheduling_error)?;
    Ok(removed > 0)
}

impl AlarmStore for SqliteAlarmStore {
    fn get_all(&self) -> Result<Vec<Alarm>, InfraError> {
        load_all(&self.connect()?)
    }

    fn create(&self, alarm: &Alarm) -> Result<(), InfraError> {
        self.replace(&[], std::slice::from_ref(alarm))
    }

    fn clear(&self, key: &AlarmKey) -> Result<bool, InfraError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction().map_err(scheduling_error)?;
        let removed = delete(&transaction, key)?;
        transaction.commit().map_err(scheduling_error)?;
        Ok(removed)
    }

    fn replace(&self, to_clear: &[AlarmKey], to_create: &[Alarm]) -> Result<(), InfraError> {
        validate_all(to_create)?;
        let mut connection = self.connect()?;
        let transaction = connection.transaction().map_err(scheduling_error)?;
        for key in to_clear {
            delete(&transaction, key)?;
        }
        for alarm in to_create {
            upsert(&transaction, alarm)?;
        }
        transaction.commit().map_err(scheduling_error)
    }

    fn next_fire_time(&self) -> Result<Option<DateTime<Utc>>, InfraError> {
        let connection = self.connect()?;
        let earliest: Option<i64> = connection
            .query_row("SELECT MIN(scheduled_at_ms) FROM alarms", [], |row| row.get(0))
            .map_err(scheduling_error)?;
        earliest
            .map(|millis| {
                DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                    InfraError::Scheduling(format!("stored alarm time {millis} is out of range"))
                })
            })
            .transpose()
    }

    fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<Alarm>, InfraError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction().map_err(scheduling_error)?;
        let due: Vec<Alarm> = load_all(&transaction)?
            .into_iter()
            .filter(|alarm| alarm.scheduled_time <= now)
            .collect();

        for alarm in &due {
            match alarm.period_minutes {
                Some(period) => upsert(
                    &transaction,
                    &Alarm {
                        scheduled_time: next_periodic_time(alarm, period, now),
                        ..alarm.clone()
                    },
                )?,
                None => {
                    delete(&transaction, &alarm.key)?;
                }
            }
        }
        transaction.commit().map_err(scheduling_error)?;
        Ok(due)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAlarmStore {
    alarms: Mutex<BTreeMap<AlarmKey, Alarm>>,
}

impl InMemoryAlarmStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<AlarmKey, Alarm>>, InfraError> {
        self.alarms
            .lock()
            .map_err(|error| InfraError::Scheduling(format!("alarm store lock poisoned: {error}")))
    }
}

fn sorted(mut alarms: Vec<Alarm>) -> Vec<Alarm> {
    alarms.sort_by(|left, right| {
        left.scheduled_time
            .cmp(&right.scheduled_time)
            .then_with(|| left.key.cmp(&right.key))
    });
    alarms
}

impl AlarmStore for InMemoryAlarmStore {
    fn get_all(&self) -> Result<Vec<Alarm>, InfraError> {
        Ok(sorted(self.lock()?.values().cloned().collect()))
    }

    fn create(&self, alarm: &Alarm) -> Result<(), InfraError> {
        self.replace(&[], std::slice::from_ref(alarm))
    }

    fn clear(&self, key: &AlarmKey) -> Result<bool, InfraError> {
        Ok(self.lock()?.remove(key).is_some())
    }

    fn replace(&self, to_clear: &[AlarmKey], to_create: &[Alarm]) -> Result<(), InfraError> {
        validate_all(to_create)?;
        let mut alarms = self.lock()?;
        for key in to_clear {
            alarms.remove(key);
        }
        for alarm in to_create {
            alarms.insert(alarm.key.clone(), alarm.clone());
        }
        Ok(())
    }

    fn next_fire_time(&self) -> Result<Option<DateTime<Utc>>, InfraError> {
        Ok(self.lock()?.values().map(|alarm| alarm.scheduled_time).min())
    }

    fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<Alarm>, InfraError> {
        let mut alarms = self.lock()?;
        let due = sorted(
            alarms
                .values()
                .filter(|alarm| alarm.scheduled_time <= now)
                .cloned()
                .collect(),
        );
        for alarm in &due {
            match alarm.period_minutes {
                Some(period) => {
                    if let Some(stored) = alarms.get_mut(&alarm.key) {
                        stored.scheduled_time = next_periodic_time(alarm, period, now);
                    }
                }
                None => {
                    alarms.remove(&alarm.key);
                }
            }
        }
        Ok(due)
    }
}
