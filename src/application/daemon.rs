use crate::application::alarm_sync::{AlarmSyncService, RefreshSummary};
use crate::application::auth::AccessTokenProvider;
use crate::application::control::ControlMessage;
use crate::application::dispatcher::{AlarmDispatcher, DispatchOutcome};
use crate::application::reporter::ErrorReporter;
use crate::domain::models::{AlarmKey, TimeOffset};
use crate::infrastructure::alarm_store::AlarmStore;
use crate::infrastructure::browser::UrlOpener;
use crate::infrastructure::config::OffsetStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_calendar_client::GoogleCalendarClient;
use crate::infrastructure::notifier::Notifier;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const MAX_IDLE: Duration = Duration::from_secs(60);
const MISSED_MEETING_GRACE_SECONDS: i64 = 120;

pub struct Daemon<P, C, O, A, U, N>
where
    P: AccessTokenProvider,
    C: GoogleCalendarClient,
    O: OffsetStore,
    A: AlarmStore,
    U: UrlOpener,
    N: Notifier,
{
    dispatcher: AlarmDispatcher<P, C, O, A, U>,
    reporter: ErrorReporter<N>,
    max_idle: Duration,
}

impl<P, C, O, A, U, N> Daemon<P, C, O, A, U, N>
where
    P: AccessTokenProvider,
    C: GoogleCalendarClient,
    O: OffsetStore,
    A: AlarmStore,
    U: UrlOpener,
    N: Notifier,
{
    pub fn new(dispatcher: AlarmDispatcher<P, C, O, A, U>, reporter: ErrorReporter<N>) -> Self {
        Self {
            dispatcher,
            reporter,
            max_idle: MAX_IDLE,
        }
    }

    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = max_idle;
        self
    }

    fn sync(&self) -> &Arc<AlarmSyncService<P, C, O, A>> {
        self.dispatcher.sync_service()
    }

    pub async fn run<F>(&self, mut control: mpsc::Receiver<ControlMessage>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        self.initialize().await;
        tokio::pin!(shutdown);
        let mut control_open = true;

        loop {
            self.run_due_alarms().await;
            let wait = self.time_until_next_alarm();

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
                message = control.recv(), if control_open => match message {
                    Some(message) => self.handle_control(message).await,
                    None => control_open = false,
                },
            }
        }
    }

    pub async fn initialize(&self) -> Option<RefreshSummary> {
        match self.try_initialize().await {
            Ok(summary) => {
                tracing::info!(
                    scheduled = summary.scheduled,
                    "Meetings will be checked every 10 minutes; daemon initialized"
                );
                Some(summary)
            }
            Err(error) => {
                self.reporter.report("initializing extension", &error);
                None
            }
        }
    }

    async fn try_initialize(&self) -> Result<RefreshSummary, InfraError> {
        self.sync().token_provider().access_token().await?;
        tracing::info!("Authentication successful");
        self.sync().arm_recurring_trigger()?;
        self.sync().refresh().await
    }

    pub async fn run_due_alarms(&self) -> Vec<DispatchOutcome> {
        let now = self.sync().now();
        let due = match self.sync().alarm_store().take_due(now) {
            Ok(due) => due,
            Err(error) => {
                self.reporter.report("checking due alarms", &error);
                return Vec::new();
            }
        };

        let mut outcomes = Vec::with_capacity(due.len());
        for alarm in due {
            // meetings missed while the daemon was down are dropped, not opened late
            if alarm.period_minutes.is_none()
                && now - alarm.scheduled_time > chrono::Duration::seconds(MISSED_MEETING_GRACE_SECONDS)
            {
                tracing::warn!(
                    alarm = %alarm.key,
                    scheduled = %alarm.scheduled_time.to_rfc3339(),
                    "dropping missed meeting alarm"
                );
                continue;
            }
            match self.dispatcher.dispatch(&alarm).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => {
                    let context = match alarm.key {
                        AlarmKey::CheckCalendar => "handling checkCalendar alarm",
                        AlarmKey::OpenMeeting { .. } => "opening meeting",
                    };
                    self.reporter.report(context, &error);
                }
            }
        }
        outcomes
    }

    pub async fn handle_control(&self, message: ControlMessage) {
        match message {
            ControlMessage::UpdateTimeOffset { time_offset } => {
                let offset = match i32::try_from(time_offset)
                    .map_err(|error| error.to_string())
                    .and_then(TimeOffset::new)
                {
                    Ok(offset) => offset,
                    Err(reason) => {
                        self.reporter
                            .report("updating time offset", &InfraError::InvalidConfig(reason));
                        return;
                    }
                };
                tracing::info!(
                    "Time offset updated to: {} minutes ({})",
                    offset.minutes(),
                    offset.direction()
                );
                if let Err(error) = self.sync().offset_store().save_offset(offset) {
                    self.reporter.report("updating time offset", &error);
                    return;
                }
                if let Err(error) = self.sync().refresh().await {
                    self.reporter.report("updating alarms", &error);
                }
            }
        }
    }

    fn time_until_next_alarm(&self) -> Duration {
        let next = match self.sync().alarm_store().next_fire_time() {
            Ok(next) => next,
            Err(error) => {
                tracing::warn!(%error, "could not read next alarm time");
                None
            }
        };
        next.map(|fire_at| {
            (fire_at - self.sync().now())
                .to_std()
                .unwrap_or(Duration::ZERO)
        })
        .map_or(self.max_idle, |wait| wait.min(self.max_idle))
    }
}
