use crate::application::auth::AccessTokenProvider;
use crate::domain::models::{Alarm, AlarmKey};
use crate::domain::reconciler::plan_alarms;
use crate::infrastructure::alarm_store::AlarmStore;
use crate::infrastructure::config::{OffsetStore, DEFAULT_LOOKAHEAD_DAYS};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::normalize_events;
use crate::infrastructure::google_calendar_client::{GoogleCalendarClient, ListEventsRequest};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RefreshSummary {
    pub considered: usize,
    pub scheduled: usize,
    pub cleared: usize,
}

pub struct AlarmSyncService<P, C, O, A>
where
    P: AccessTokenProvider,
    C: GoogleCalendarClient,
    O: OffsetStore,
    A: AlarmStore,
{
    token_provider: Arc<P>,
    calendar_client: Arc<C>,
    offset_store: Arc<O>,
    alarm_store: Arc<A>,
    lookahead_days: i64,
    now_provider: NowProvider,
}

impl<P, C, O, A> AlarmSyncService<P, C, O, A>
where
    P: AccessTokenProvider,
    C: GoogleCalendarClient,
    O: OffsetStore,
    A: AlarmStore,
{
    pub fn new(
        token_provider: Arc<P>,
        calendar_client: Arc<C>,
        offset_store: Arc<O>,
        alarm_store: Arc<A>,
    ) -> Self {
        Self {
            token_provider,
            calendar_client,
            offset_store,
            alarm_store,
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_lookahead_days(mut self, lookahead_days: i64) -> Self {
        self.lookahead_days = lookahead_days;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    pub fn token_provider(&self) -> &Arc<P> {
        &self.token_provider
    }

    pub fn offset_store(&self) -> &Arc<O> {
        &self.offset_store
    }

    pub fn alarm_store(&self) -> &Arc<A> {
        &self.alarm_store
    }

    pub async fn refresh(&self) -> Result<RefreshSummary, InfraError> {
        let access_token = self.token_provider.access_token().await?;
        let now = self.now();
        let request = ListEventsRequest {
            time_min: now,
            time_max: now + Duration::days(self.lookahead_days),
        };
        let raw_events = self
            .calendar_client
            .list_events(&access_token, request)
            .await?;
        let events = normalize_events(&raw_events);

        let offset = self.offset_store.load_offset()?;
        let existing = self.alarm_store.get_all()?;
        // the fetch may have taken a while; plan against the current instant
        let now = self.now();
        let plan = plan_alarms(now, i64::from(offset.minutes()), &events, &existing);

        let alarms: Vec<Alarm> = plan.to_schedule.iter().map(|action| action.to_alarm()).collect();
        self.alarm_store.replace(&plan.to_clear, &alarms)?;

        for alarm in &alarms {
            tracing::info!(
                alarm = %alarm.key,
                open_time = %alarm.scheduled_time.to_rfc3339(),
                "Alarm created"
            );
        }
        tracing::info!(
            "Processed {} events, scheduled {} for auto-join",
            plan.considered,
            alarms.len()
        );

        Ok(RefreshSummary {
            considered: plan.considered,
            scheduled: alarms.len(),
            cleared: plan.to_clear.len(),
        })
    }

    pub fn arm_recurring_trigger(&self) -> Result<Alarm, InfraError> {
        let alarm = Alarm::check_calendar(self.now());
        self.alarm_store
            .replace(&[AlarmKey::CheckCalendar], std::slice::from_ref(&alarm))?;
        tracing::debug!(next_fire = %alarm.scheduled_time.to_rfc3339(), "periodic trigger armed");
        Ok(alarm)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::models::TimeOffset;
    use crate::infrastructure::alarm_store::InMemoryAlarmStore;
    use crate::infrastructure::config::InMemoryOffsetStore;
    use crate::infrastructure::error::FetchError;
    use crate::infrastructure::event_mapper::{CalendarEventStart, GoogleCalendarEvent};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use url::Url;

    pub(crate) fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-16T09:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[derive(Debug, Default)]
    pub(crate) struct StaticTokenProvider {
        pub(crate) fail: bool,
    }

    #[async_trait]
    impl AccessTokenProvider for StaticTokenProvider {
        async fn access_token(&self) -> Result<String, InfraError> {
            if self.fail {
                Err(InfraError::Auth("No token received".to_string()))
            } else {
                Ok("test-token".to_string())
            }
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct FakeCalendarClient {
        events: Mutex<Vec<GoogleCalendarEvent>>,
        fail: Mutex<bool>,
        pub(crate) requests: Mutex<Vec<ListEventsRequest>>,
        pub(crate) calls: AtomicUsize,
    }

    impl FakeCalendarClient {
        pub(crate) fn set_events(&self, events: Vec<GoogleCalendarEvent>) {
            *self.events.lock().expect("events lock poisoned") = events;
        }

        pub(crate) fn set_failing(&self, fail: bool) {
            *self.fail.lock().expect("fail lock poisoned") = fail;
        }
    }

    #[async_trait]
    impl GoogleCalendarClient for FakeCalendarClient {
        async fn list_events(
            &self,
            access_token: &str,
            request: ListEventsRequest,
        ) -> Result<Vec<GoogleCalendarEvent>, InfraError> {
            assert_eq!(access_token, "test-token");
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests
                .lock()
                .expect("requests lock poisoned")
                .push(request);
            if *self.fail.lock().expect("fail lock poisoned") {
                return Err(FetchError::HttpStatus { status: 503 }.into());
            }
            Ok(self.events.lock().expect("events lock poisoned").clone())
        }
    }

    pub(crate) fn raw_event(summary: &str, start: DateTime<Utc>, link: Option<&str>) -> GoogleCalendarEvent {
        GoogleCalendarEvent {
            summary: Some(summary.to_string()),
            hangout_link: link.map(ToOwned::to_owned),
            start: Some(CalendarEventStart {
                date_time: Some(start.to_rfc3339()),
                ..CalendarEventStart::default()
            }),
            ..GoogleCalendarEvent::default()
        }
    }

    pub(crate) type TestService =
        AlarmSyncService<StaticTokenProvider, FakeCalendarClient, InMemoryOffsetStore, InMemoryAlarmStore>;

    pub(crate) fn service_at(now: DateTime<Utc>) -> (TestService, Arc<FakeCalendarClient>, Arc<InMemoryAlarmStore>) {
        let client = Arc::new(FakeCalendarClient::default());
        let alarms = Arc::new(InMemoryAlarmStore::default());
        let service = AlarmSyncService::new(
            Arc::new(StaticTokenProvider::default()),
            Arc::clone(&client),
            Arc::new(InMemoryOffsetStore::default()),
            Arc::clone(&alarms),
        )
        .with_now_provider(Arc::new(move || now));
        (service, client, alarms)
    }

    fn meeting_key(url: &str) -> AlarmKey {
        AlarmKey::OpenMeeting {
            url: Url::parse(url).expect("valid url"),
        }
    }

    #[tokio::test]
    async fn refresh_schedules_future_meeting_with_offset() {
        let (service, client, alarms) = service_at(t0());
        service
            .offset_store()
            .save_offset(TimeOffset::new(5).expect("offset"))
            .expect("save");
        client.set_events(vec![
            raw_event("Standup", t0() + Duration::minutes(20), Some("https://meet.google.com/m1")),
            raw_event("Started", t0() - Duration::minutes(5), Some("https://meet.google.com/m2")),
        ]);

        let summary = service.refresh().await.expect("refresh");

        assert_eq!(
            summary,
            RefreshSummary {
                considered: 2,
                scheduled: 1,
                cleared: 0
            }
        );
        let stored = alarms.get_all().expect("alarms");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].key, meeting_key("https://meet.google.com/m1"));
        assert_eq!(stored[0].scheduled_time, t0() + Duration::minutes(15));
        assert_eq!(stored[0].period_minutes, None);
    }

    #[tokio::test]
    async fn refresh_requests_the_lookahead_window() {
        let (service, client, _) = service_at(t0());
        let service = service.with_lookahead_days(3);

        service.refresh().await.expect("refresh");

        let requests = client.requests.lock().expect("requests lock poisoned");
        assert_eq!(requests[0].time_min, t0());
        assert_eq!(requests[0].time_max, t0() + Duration::days(3));
    }

    #[tokio::test]
    async fn repeated_refresh_keeps_the_same_alarm_set_and_trigger() {
        let (service, client, alarms) = service_at(t0());
        client.set_events(vec![raw_event(
            "Review",
            t0() + Duration::hours(2),
            Some("https://meet.google.com/review"),
        )]);
        service.arm_recurring_trigger().expect("arm");

        service.refresh().await.expect("first");
        let first = alarms.get_all().expect("alarms");
        let summary = service.refresh().await.expect("second");
        let second = alarms.get_all().expect("alarms");

        assert_eq!(first, second);
        assert_eq!(summary.cleared, 1);
        assert!(second.iter().any(|alarm| alarm.key == AlarmKey::CheckCalendar));
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn empty_calendar_clears_stale_meetings() {
        let (service, client, alarms) = service_at(t0());
        client.set_events(vec![raw_event(
            "Cancelled later",
            t0() + Duration::hours(1),
            Some("https://meet.google.com/gone"),
        )]);
        service.refresh().await.expect("first");
        client.set_events(Vec::new());

        let summary = service.refresh().await.expect("second");

        assert_eq!(summary.scheduled, 0);
        assert_eq!(summary.cleared, 1);
        assert!(alarms.get_all().expect("alarms").is_empty());
    }

    #[tokio::test]
    async fn failed_fetch_leaves_alarms_untouched() {
        let (service, client, alarms) = service_at(t0());
        client.set_events(vec![raw_event(
            "Planning",
            t0() + Duration::hours(1),
            Some("https://meet.google.com/plan"),
        )]);
        service.refresh().await.expect("first");
        let before = alarms.get_all().expect("alarms");
        client.set_failing(true);

        let result = service.refresh().await;

        assert!(matches!(
            result,
            Err(InfraError::Fetch(FetchError::HttpStatus { status: 503 }))
        ));
        assert_eq!(alarms.get_all().expect("alarms"), before);
    }

    #[tokio::test]
    async fn missing_token_aborts_before_fetching() {
        let client = Arc::new(FakeCalendarClient::default());
        let service = AlarmSyncService::new(
            Arc::new(StaticTokenProvider { fail: true }),
            Arc::clone(&client),
            Arc::new(InMemoryOffsetStore::default()),
            Arc::new(InMemoryAlarmStore::default()),
        );

        assert!(matches!(service.refresh().await, Err(InfraError::Auth(_))));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn arming_the_trigger_replaces_the_previous_one() {
        let (service, _, alarms) = service_at(t0());
        alarms
            .create(&Alarm {
                key: AlarmKey::CheckCalendar,
                scheduled_time: t0() - Duration::hours(3),
                period_minutes: Some(10),
            })
            .expect("create");

        let armed = service.arm_recurring_trigger().expect("arm");

        assert_eq!(armed.scheduled_time, t0() + Duration::minutes(10));
        assert_eq!(alarms.get_all().expect("alarms"), vec![armed]);
    }
}
