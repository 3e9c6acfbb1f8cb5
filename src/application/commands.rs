use crate::application::alarm_sync::{AlarmSyncService, RefreshSummary};
use crate::application::auth::{AccessTokenProvider, EnsureTokenResult, OAuthConfig, OAuthManager};
use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::control::spawn_stdin_reader;
use crate::application::daemon::Daemon;
use crate::application::dispatcher::AlarmDispatcher;
use crate::application::reporter::ErrorReporter;
use crate::domain::models::{Alarm, TimeOffset};
use crate::infrastructure::alarm_store::{AlarmStore, SqliteAlarmStore};
use crate::infrastructure::browser::{UrlOpener, WebBrowserOpener};
use crate::infrastructure::config::{JsonOffsetStore, OffsetStore};
use crate::infrastructure::credential_store::{CredentialStore, KeyringCredentialStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_calendar_client::{GoogleCalendarClient, RetryingGoogleCalendarClient};
use crate::infrastructure::http_retry::{ReqwestTransport, RetryFetchClient};
use crate::infrastructure::notifier::TracingNotifier;
use crate::infrastructure::token_endpoint::{ReqwestTokenEndpoint, TokenEndpoint};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

const CONTROL_CHANNEL_CAPACITY: usize = 16;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

type ProductionAuth = OAuthManager<KeyringCredentialStore, ReqwestTokenEndpoint>;
type ProductionCalendar = RetryingGoogleCalendarClient<ReqwestTransport>;

pub struct AppState {
    bootstrap: BootstrapResult,
    offset_store: Arc<JsonOffsetStore>,
    alarm_store: Arc<SqliteAlarmStore>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let offset_store = Arc::new(JsonOffsetStore::new(&bootstrap.config_dir));
        let alarm_store = Arc::new(SqliteAlarmStore::new(&bootstrap.database_path));

        Ok(Self {
            bootstrap,
            offset_store,
            alarm_store,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.bootstrap.config_dir
    }

    pub fn logs_dir(&self) -> &Path {
        &self.bootstrap.logs_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.bootstrap.database_path
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        tracing::error!(command, error = %error, "command failed");
        error.to_string()
    }

    pub fn sync_service<P, C>(
        &self,
        token_provider: Arc<P>,
        calendar_client: Arc<C>,
    ) -> AlarmSyncService<P, C, JsonOffsetStore, SqliteAlarmStore>
    where
        P: AccessTokenProvider,
        C: GoogleCalendarClient,
    {
        AlarmSyncService::new(
            token_provider,
            calendar_client,
            Arc::clone(&self.offset_store),
            Arc::clone(&self.alarm_store),
        )
        .with_lookahead_days(self.bootstrap.lookahead_days)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OffsetResponse {
    pub time_offset: i32,
    pub slider_value: i32,
    pub label: String,
    pub description: String,
}

impl From<TimeOffset> for OffsetResponse {
    fn from(offset: TimeOffset) -> Self {
        Self {
            time_offset: offset.minutes(),
            slider_value: offset.slider_value(),
            label: offset.label().to_string(),
            description: offset.describe(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AlarmResponse {
    pub name: String,
    pub kind: String,
    pub scheduled_at: String,
    pub period_minutes: Option<u32>,
    pub url: Option<String>,
}

impl From<&Alarm> for AlarmResponse {
    fn from(alarm: &Alarm) -> Self {
        Self {
            name: alarm.key.to_string(),
            kind: alarm.key.kind().to_string(),
            scheduled_at: alarm.scheduled_time.to_rfc3339(),
            period_minutes: alarm.period_minutes,
            url: alarm.key.meeting_url().map(Url::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuthenticateResponse {
    pub status: String,
    pub authorization_url: Option<String>,
    pub expires_at: Option<String>,
}

pub fn show_offset_impl(state: &AppState) -> Result<OffsetResponse, InfraError> {
    Ok(state.offset_store.load_offset()?.into())
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SetOffsetResponse {
    #[serde(flatten)]
    pub offset: OffsetResponse,
    pub rescheduled: Option<RefreshSummary>,
}

pub async fn set_offset_impl(state: &AppState, offset: TimeOffset) -> Result<SetOffsetResponse, InfraError> {
    let saved = save_offset(state, offset)?;
    let rescheduled = match (production_auth(), production_calendar()) {
        (Ok(auth), Ok(calendar)) => {
            reschedule(state, &state.sync_service(Arc::new(auth), Arc::new(calendar))).await
        }
        (Err(error), _) | (_, Err(error)) => {
            state.command_error("offset", &error);
            None
        }
    };
    Ok(SetOffsetResponse {
        offset: saved,
        rescheduled,
    })
}

pub async fn set_offset_with<P, C>(
    state: &AppState,
    offset: TimeOffset,
    service: &AlarmSyncService<P, C, JsonOffsetStore, SqliteAlarmStore>,
) -> Result<SetOffsetResponse, InfraError>
where
    P: AccessTokenProvider,
    C: GoogleCalendarClient,
{
    let saved = save_offset(state, offset)?;
    Ok(SetOffsetResponse {
        offset: saved,
        rescheduled: reschedule(state, service).await,
    })
}

fn save_offset(state: &AppState, offset: TimeOffset) -> Result<OffsetResponse, InfraError> {
    state.offset_store.save_offset(offset)?;
    tracing::info!(
        "Time offset updated to: {} minutes ({})",
        offset.minutes(),
        offset.direction()
    );
    Ok(offset.into())
}

// a failed pass leaves the saved offset in place
async fn reschedule<P, C>(
    state: &AppState,
    service: &AlarmSyncService<P, C, JsonOffsetStore, SqliteAlarmStore>,
) -> Option<RefreshSummary>
where
    P: AccessTokenProvider,
    C: GoogleCalendarClient,
{
    match service.refresh().await {
        Ok(summary) => Some(summary),
        Err(error) => {
            state.command_error("offset", &error);
            None
        }
    }
}

pub fn list_alarms_impl(state: &AppState) -> Result<Vec<AlarmResponse>, InfraError> {
    Ok(state
        .alarm_store
        .get_all()?
        .iter()
        .map(AlarmResponse::from)
        .collect())
}

fn production_auth() -> Result<ProductionAuth, InfraError> {
    let config = OAuthConfig::from_env()?;
    Ok(OAuthManager::new(
        config,
        Arc::new(KeyringCredentialStore::default()),
        Arc::new(ReqwestTokenEndpoint::new()),
    ))
}

fn production_calendar() -> Result<ProductionCalendar, InfraError> {
    RetryingGoogleCalendarClient::new(RetryFetchClient::new(Arc::new(ReqwestTransport::new())))
}

pub async fn authenticate_impl(authorization_code: Option<String>) -> Result<AuthenticateResponse, InfraError> {
    let manager = production_auth()?;
    authenticate_with(&manager, authorization_code, &WebBrowserOpener).await
}

pub async fn authenticate_with<S, E, U>(
    manager: &OAuthManager<S, E>,
    authorization_code: Option<String>,
    opener: &U,
) -> Result<AuthenticateResponse, InfraError>
where
    S: CredentialStore,
    E: TokenEndpoint,
    U: UrlOpener,
{
    if let Some(code) = authorization_code {
        let token = manager.authenticate_with_code(&code).await?;
        return Ok(AuthenticateResponse {
            status: "authenticated".to_string(),
            authorization_url: None,
            expires_at: Some(token.expires_at.to_rfc3339()),
        });
    }

    match manager.ensure_access_token().await? {
        EnsureTokenResult::Existing(token) => Ok(AuthenticateResponse {
            status: "existing".to_string(),
            authorization_url: None,
            expires_at: Some(token.expires_at.to_rfc3339()),
        }),
        EnsureTokenResult::Refreshed(token) => Ok(AuthenticateResponse {
            status: "refreshed".to_string(),
            authorization_url: None,
            expires_at: Some(token.expires_at.to_rfc3339()),
        }),
        EnsureTokenResult::ReauthenticationRequired => {
            let authorization_url = manager.build_authorization_url(&next_id("oauth-state"))?;
            let consent_url = Url::parse(&authorization_url)
                .map_err(|error| InfraError::OAuth(format!("invalid authorization url: {error}")))?;
            if let Err(error) = opener.open(&consent_url) {
                tracing::warn!(%error, "could not open the consent page; open it manually");
            }
            Ok(AuthenticateResponse {
                status: "reauthentication_required".to_string(),
                authorization_url: Some(authorization_url),
                expires_at: None,
            })
        }
    }
}

pub async fn refresh_impl(state: &AppState) -> Result<RefreshSummary, InfraError> {
    let service = state.sync_service(Arc::new(production_auth()?), Arc::new(production_calendar()?));
    service.refresh().await
}

pub async fn run_daemon(state: &AppState) -> Result<(), InfraError> {
    let service = state.sync_service(Arc::new(production_auth()?), Arc::new(production_calendar()?));
    let daemon = Daemon::new(
        AlarmDispatcher::new(Arc::new(service), Arc::new(WebBrowserOpener)),
        ErrorReporter::new(Arc::new(TracingNotifier)),
    );

    let (sender, receiver) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
    let reader = spawn_stdin_reader(sender);
    tracing::info!(database = %state.database_path().display(), "Knob_joiner started");

    daemon
        .run(receiver, async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::warn!(%error, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;

    reader.abort();
    Ok(())
}
