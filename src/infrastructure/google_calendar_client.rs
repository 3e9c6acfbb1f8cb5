use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::GoogleCalendarEvent;
use crate::infrastructure::http_retry::{HttpTransport, RetryFetchClient};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use url::Url;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/";
pub const PRIMARY_CALENDAR_ID: &str = "primary";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEventsRequest {
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
}

#[async_trait]
pub trait GoogleCalendarClient: Send + Sync {
    async fn list_events(
        &self,
        access_token: &str,
        request: ListEventsRequest,
    ) -> Result<Vec<GoogleCalendarEvent>, InfraError>;
}

pub struct RetryingGoogleCalendarClient<T>
where
    T: HttpTransport,
{
    fetcher: RetryFetchClient<T>,
    api_base: Url,
    calendar_id: String,
}

impl<T> RetryingGoogleCalendarClient<T>
where
    T: HttpTransport,
{
    pub fn new(fetcher: RetryFetchClient<T>) -> Result<Self, InfraError> {
        let api_base = Url::parse(CALENDAR_API_BASE)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid calendar api base url: {error}")))?;
        Ok(Self {
            fetcher,
            api_base,
            calendar_id: PRIMARY_CALENDAR_ID.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: Url) -> Self {
        self.api_base = api_base;
        self
    }

    fn events_endpoint(&self) -> Result<Url, InfraError> {
        let mut url = self.api_base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("calendar api base URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("calendars");
            segments.push(&self.calendar_id);
            segments.push("events");
        }
        Ok(url)
    }

    fn page_url(
        &self,
        request: &ListEventsRequest,
        page_token: Option<&str>,
    ) -> Result<Url, InfraError> {
        let mut url = self.events_endpoint()?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("timeMin", &request.time_min.to_rfc3339_opts(SecondsFormat::Millis, true))
                .append_pair("timeMax", &request.time_max.to_rfc3339_opts(SecondsFormat::Millis, true))
                .append_pair("singleEvents", "true")
                .append_pair("orderBy", "startTime");
            if let Some(page_token) = page_token {
                query.append_pair("pageToken", page_token);
            }
        }
        Ok(url)
    }
}

#[derive(Debug, serde::Deserialize)]
struct EventsPageResponse {
    items: Option<Vec<serde_json::Value>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[async_trait]
impl<T> GoogleCalendarClient for RetryingGoogleCalendarClient<T>
where
    T: HttpTransport,
{
    async fn list_events(
        &self,
        access_token: &str,
        request: ListEventsRequest,
    ) -> Result<Vec<GoogleCalendarEvent>, InfraError> {
        let access_token = access_token.trim();
        if access_token.is_empty() {
            return Err(InfraError::Auth("No token received".to_string()));
        }
        let headers = vec![("Authorization".to_string(), format!("Bearer {access_token}"))];

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let url = self.page_url(&request, page_token.as_deref())?;
            let payload = self.fetcher.fetch_json(&url, &headers).await?;
            let page: EventsPageResponse = serde_json::from_value(payload)?;

            for item in page.items.unwrap_or_default() {
                match serde_json::from_value::<GoogleCalendarEvent>(item) {
                    Ok(event) => events.push(event),
                    Err(error) => tracing::warn!(%error, "skipping undecodable calendar event"),
                }
            }

            match page.next_page_token.filter(|token| !token.trim().is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(events)
    }
}
