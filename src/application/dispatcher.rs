use crate::application::alarm_sync::{AlarmSyncService, RefreshSummary};
use crate::application::auth::AccessTokenProvider;
use crate::domain::models::{Alarm, AlarmKey};
use crate::infrastructure::alarm_store::AlarmStore;
use crate::infrastructure::browser::UrlOpener;
use crate::infrastructure::config::OffsetStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_calendar_client::GoogleCalendarClient;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Opened(Url),
    Refreshed(RefreshSummary),
}

pub struct AlarmDispatcher<P, C, O, A, U>
where
    P: AccessTokenProvider,
    C: GoogleCalendarClient,
    O: OffsetStore,
    A: AlarmStore,
    U: UrlOpener,
{
    sync_service: Arc<AlarmSyncService<P, C, O, A>>,
    opener: Arc<U>,
}

impl<P, C, O, A, U> AlarmDispatcher<P, C, O, A, U>
where
    P: AccessTokenProvider,
    C: GoogleCalendarClient,
    O: OffsetStore,
    A: AlarmStore,
    U: UrlOpener,
{
    pub fn new(sync_service: Arc<AlarmSyncService<P, C, O, A>>, opener: Arc<U>) -> Self {
        Self {
            sync_service,
            opener,
        }
    }

    pub fn sync_service(&self) -> &Arc<AlarmSyncService<P, C, O, A>> {
        &self.sync_service
    }

    pub async fn dispatch(&self, alarm: &Alarm) -> Result<DispatchOutcome, InfraError> {
        match &alarm.key {
            AlarmKey::CheckCalendar => {
                tracing::info!(
                    at = %self.sync_service.now().to_rfc3339(),
                    "Alarm triggered: checking for meetings now"
                );
                let summary = self.sync_service.refresh().await?;
                Ok(DispatchOutcome::Refreshed(summary))
            }
            AlarmKey::OpenMeeting { url } => {
                tracing::info!(%url, "Opening scheduled meeting");
                self.opener.open(url)?;
                Ok(DispatchOutcome::Opened(url.clone()))
            }
        }
    }
}
