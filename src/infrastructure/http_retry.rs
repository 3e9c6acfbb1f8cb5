use crate::infrastructure::error::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &Url, headers: &[(String, String)]) -> Result<HttpResponse, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url, headers: &[(String, String)]) -> Result<HttpResponse, FetchError> {
        let mut request = self.client.get(url.clone());
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|error| FetchError::Network(error.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|error| FetchError::Network(format!("failed reading response body: {error}")))?;

        Ok(HttpResponse { status, body })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
        }
    }
}

pub struct RetryFetchClient<T>
where
    T: HttpTransport,
{
    transport: Arc<T>,
    retry_policy: RetryPolicy,
}

impl<T> RetryFetchClient<T>
where
    T: HttpTransport,
{
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub async fn fetch_json(
        &self,
        url: &Url,
        headers: &[(String, String)],
    ) -> Result<serde_json::Value, FetchError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut delay = self.retry_policy.initial_delay;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.attempt(url, headers).await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "Attempt {attempt} failed, retrying in {}ms",
                        delay.as_millis()
                    );
                    sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(error) => {
                    tracing::warn!(attempt, max_attempts, %error, "Attempt {attempt} failed, giving up");
                    return Err(error);
                }
            }
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        headers: &[(String, String)],
    ) -> Result<serde_json::Value, FetchError> {
        let response = self.transport.get(url, headers).await?;
        if !response.is_success() {
            return Err(FetchError::HttpStatus {
                status: response.status,
            });
        }
        serde_json::from_str(&response.body).map_err(|error| FetchError::Decode(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Debug)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, FetchError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<HttpResponse, FetchError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().expect("calls lock poisoned").clone()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn get(
            &self,
            _url: &Url,
            _headers: &[(String, String)],
        ) -> Result<HttpResponse, FetchError> {
            self.calls.lock().expect("calls lock poisoned").push(Instant::now());
            self.responses
                .lock()
                .expect("responses lock poisoned")
                .pop_front()
                .unwrap_or(Err(FetchError::Network("script exhausted".to_string())))
        }
    }

    fn ok(body: &str) -> Result<HttpResponse, FetchError> {
        Ok(HttpResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    fn status(code: u16) -> Result<HttpResponse, FetchError> {
        Ok(HttpResponse {
            status: code,
            body: String::new(),
        })
    }

    fn endpoint() -> Url {
        Url::parse("https://example.test/events").expect("valid url")
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_doubling_delays() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(FetchError::Network("connection reset".to_string())),
            status(503),
            ok(r#"{"items":[]}"#),
        ]));
        let client = RetryFetchClient::new(Arc::clone(&transport));

        let value = client.fetch_json(&endpoint(), &[]).await.expect("third attempt succeeds");

        assert_eq!(value, serde_json::json!({ "items": [] }));
        let calls = transport.call_times();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_millis(1000));
        assert_eq!(calls[2] - calls[1], Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts_with_last_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            status(500),
            status(502),
            status(401),
            ok("{}"),
        ]));
        let client = RetryFetchClient::new(Arc::clone(&transport));

        let error = client.fetch_json(&endpoint(), &[]).await.expect_err("all attempts fail");

        assert_eq!(error, FetchError::HttpStatus { status: 401 });
        assert_eq!(transport.call_times().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn respects_custom_attempt_budget() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let client = RetryFetchClient::new(Arc::clone(&transport)).with_retry_policy(RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
        });

        let started = Instant::now();
        let error = client.fetch_json(&endpoint(), &[]).await.expect_err("script is empty");

        assert!(matches!(error, FetchError::Network(_)));
        assert_eq!(transport.call_times().len(), 5);
        assert_eq!(started.elapsed(), Duration::from_millis(10 + 20 + 40 + 80));
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_body_is_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok("not json"), ok(r#"{"ok":true}"#)]));
        let client = RetryFetchClient::new(Arc::clone(&transport));

        let value = client.fetch_json(&endpoint(), &[]).await.expect("second attempt succeeds");

        assert_eq!(value["ok"], serde_json::json!(true));
        assert_eq!(transport.call_times().len(), 2);
    }

    #[tokio::test]
    async fn reqwest_transport_sends_headers_and_retries_server_errors() {
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(header("authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": [1] })))
            .mount(&server)
            .await;

        let client = RetryFetchClient::new(Arc::new(ReqwestTransport::new())).with_retry_policy(
            RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
            },
        );
        let url = Url::parse(&format!("{}/events", server.uri())).expect("mock url");
        let headers = vec![("Authorization".to_string(), "Bearer token-123".to_string())];

        let value = client.fetch_json(&url, &headers).await.expect("retry succeeds");

        assert_eq!(value["items"], serde_json::json!([1]));
        let received = server.received_requests().await.expect("recording enabled");
        assert_eq!(received.len(), 2);
    }
}
