use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode { code: String, redirect_uri: String },
    RefreshToken { refresh_token: String },
}

impl TokenGrant {
    fn form(&self, client_id: &str, client_secret: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("client_id", client_id.to_string()),
            ("client_secret", client_secret.to_string()),
        ];
        match self {
            Self::AuthorizationCode { code, redirect_uri } => {
                params.push(("grant_type", "authorization_code".to_string()));
                params.push(("code", code.clone()));
                params.push(("redirect_uri", redirect_uri.clone()));
            }
            Self::RefreshToken { refresh_token } => {
                params.push(("grant_type", "refresh_token".to_string()));
                params.push(("refresh_token", refresh_token.clone()));
            }
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEndpointRequest {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    pub grant: TokenGrant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEndpointResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn request_token(
        &self,
        request: TokenEndpointRequest,
    ) -> Result<TokenEndpointResponse, InfraError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTokenEndpoint {
    client: Client,
}

impl ReqwestTokenEndpoint {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct TokenPayload {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn parse_token_payload(status: u16, body: &str) -> Result<TokenEndpointResponse, InfraError> {
    let payload = serde_json::from_str::<TokenPayload>(body).map_err(|error| {
        InfraError::OAuth(format!("invalid token response payload: {error}; body={body}"))
    })?;

    if !(200..300).contains(&status) || payload.error.is_some() {
        let code = payload.error.unwrap_or_else(|| format!("http_{status}"));
        let detail = payload.error_description.unwrap_or_else(|| body.to_string());
        return Err(InfraError::OAuth(format!("token endpoint error: {code}; {detail}")));
    }

    let access_token = payload
        .access_token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| InfraError::OAuth("token response did not include access_token".to_string()))?;

    Ok(TokenEndpointResponse {
        access_token,
        refresh_token: payload.refresh_token,
        expires_in: payload.expires_in.unwrap_or(0).max(0),
        token_type: payload.token_type,
        scope: payload.scope,
    })
}

#[async_trait]
impl TokenEndpoint for ReqwestTokenEndpoint {
    async fn request_token(
        &self,
        request: TokenEndpointRequest,
    ) -> Result<TokenEndpointResponse, InfraError> {
        let form = request.grant.form(&request.client_id, &request.client_secret);
        let response = self
            .client
            .post(&request.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|error| InfraError::OAuth(format!("request failed: {error}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::OAuth(format!("failed reading token response: {error}")))?;

        parse_token_payload(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_grant_form_carries_refresh_token() {
        let form = TokenGrant::RefreshToken {
            refresh_token: "r-1".to_string(),
        }
        .form("id", "secret");
        assert!(form.contains(&("grant_type", "refresh_token".to_string())));
        assert!(form.contains(&("refresh_token", "r-1".to_string())));
        assert!(!form.iter().any(|(name, _)| *name == "code"));
    }

    #[test]
    fn error_payload_becomes_oauth_error() {
        let result = parse_token_payload(
            400,
            r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#,
        );
        match result {
            Err(InfraError::OAuth(message)) => {
                assert!(message.contains("invalid_grant"));
                assert!(message.contains("expired or revoked"));
            }
            other => panic!("expected oauth error, got {other:?}"),
        }
    }

    #[test]
    fn success_payload_defaults_missing_expiry_to_zero() {
        let parsed = parse_token_payload(200, r#"{"access_token":"a","token_type":"Bearer"}"#)
            .expect("parse");
        assert_eq!(parsed.access_token, "a");
        assert_eq!(parsed.expires_in, 0);
        assert!(parse_token_payload(200, r#"{"access_token":"  "}"#).is_err());
    }

    #[tokio::test]
    async fn reqwest_endpoint_posts_form_encoded_grant() {
        use wiremock::matchers::{body_string_contains, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "refresh_token": "keep",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let response = ReqwestTokenEndpoint::new()
            .request_token(TokenEndpointRequest {
                token_endpoint: format!("{}/token", server.uri()),
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                grant: TokenGrant::AuthorizationCode {
                    code: "abc".to_string(),
                    redirect_uri: "http://127.0.0.1:8080/oauth2/callback".to_string(),
                },
            })
            .await
            .expect("token");

        assert_eq!(response.access_token, "fresh");
        assert_eq!(response.refresh_token.as_deref(), Some("keep"));
        assert_eq!(response.expires_in, 3599);
    }
}
