use crate::domain::models::TimeOffset;
use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const APP_JSON: &str = "app.json";
const KEY_TIME_OFFSET: &str = "timeOffset";
const KEY_LOOKAHEAD_DAYS: &str = "lookaheadDays";
pub const DEFAULT_LOOKAHEAD_DAYS: i64 = 14;
const MAX_LOOKAHEAD_DAYS: i64 = 365;

fn default_app_config() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "appName": "Knob_joiner",
        KEY_TIME_OFFSET: 0,
        KEY_LOOKAHEAD_DAYS: DEFAULT_LOOKAHEAD_DAYS
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        write_config(&path, &default_app_config())?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn write_config(path: &Path, value: &serde_json::Value) -> Result<(), InfraError> {
    let formatted = serde_json::to_string_pretty(value)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

pub fn read_lookahead_days(config_dir: &Path) -> Result<i64, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let days = app
        .get(KEY_LOOKAHEAD_DAYS)
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(DEFAULT_LOOKAHEAD_DAYS);
    if !(1..=MAX_LOOKAHEAD_DAYS).contains(&days) {
        return Err(InfraError::InvalidConfig(format!(
            "{KEY_LOOKAHEAD_DAYS} must be between 1 and {MAX_LOOKAHEAD_DAYS}, got {days}"
        )));
    }
    Ok(days)
}

pub trait OffsetStore: Send + Sync {
    fn load_offset(&self) -> Result<TimeOffset, InfraError>;
    fn save_offset(&self, offset: TimeOffset) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct JsonOffsetStore {
    config_dir: PathBuf,
}

impl JsonOffsetStore {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    fn path(&self) -> PathBuf {
        self.config_dir.join(APP_JSON)
    }
}

fn storage_error(error: InfraError) -> InfraError {
    match error {
        InfraError::Storage(_) => error,
        other => InfraError::Storage(other.to_string()),
    }
}

impl OffsetStore for JsonOffsetStore {
    fn load_offset(&self) -> Result<TimeOffset, InfraError> {
        let app = read_config(&self.path()).map_err(storage_error)?;
        let offset = match app.get(KEY_TIME_OFFSET) {
            None | Some(serde_json::Value::Null) => TimeOffset::default(),
            Some(value) => {
                let minutes = value.as_i64().ok_or_else(|| {
                    InfraError::Storage(format!("{KEY_TIME_OFFSET} must be an integer, got {value}"))
                })?;
                let offset = TimeOffset::clamped(minutes);
                if i64::from(offset.minutes()) != minutes {
                    tracing::warn!(stored = minutes, clamped = offset.minutes(), "time offset out of range; clamping");
                }
                offset
            }
        };
        Ok(offset)
    }

    fn save_offset(&self, offset: TimeOffset) -> Result<(), InfraError> {
        let path = self.path();
        let mut app = read_config(&path).map_err(storage_error)?;
        let object = app.as_object_mut().ok_or_else(|| {
            InfraError::Storage(format!("invalid object structure in {}", path.display()))
        })?;
        object.insert(
            KEY_TIME_OFFSET.to_string(),
            serde_json::Value::from(offset.minutes()),
        );
        write_config(&path, &app).map_err(storage_error)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOffsetStore {
    offset: Mutex<Option<TimeOffset>>,
}

impl OffsetStore for InMemoryOffsetStore {
    fn load_offset(&self) -> Result<TimeOffset, InfraError> {
        let guard = self
            .offset
            .lock()
            .map_err(|error| InfraError::Storage(format!("offset lock poisoned: {error}")))?;
        Ok(guard.unwrap_or_default())
    }

    fn save_offset(&self, offset: TimeOffset) -> Result<(), InfraError> {
        let mut guard = self
            .offset
            .lock()
            .map_err(|error| InfraError::Storage(format!("offset lock poisoned: {error}")))?;
        *guard = Some(offset);
        Ok(())
    }
}
