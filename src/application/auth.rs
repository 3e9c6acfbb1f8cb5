use crate::domain::models::OAuthToken;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::token_endpoint::{
    TokenEndpoint, TokenEndpointRequest, TokenEndpointResponse, TokenGrant,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use url::Url;

const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8080/oauth2/callback";
const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";
const TOKEN_LEEWAY_SECONDS: i64 = 60;

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub token_endpoint: String,
    pub authorization_endpoint: String,
}

impl OAuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes,
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            authorization_endpoint: DEFAULT_AUTHORIZATION_ENDPOINT.to_string(),
        }
    }

    pub fn from_env() -> Result<Self, InfraError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, InfraError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_id = required_lookup_value(
            &lookup,
            &["KNOB_JOINER_GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_ID"],
            "google client id",
        )?;
        let client_secret = required_lookup_value(
            &lookup,
            &["KNOB_JOINER_GOOGLE_CLIENT_SECRET", "GOOGLE_CLIENT_SECRET"],
            "google client secret",
        )?;
        let redirect_uri = optional_lookup_value(
            &lookup,
            &["KNOB_JOINER_GOOGLE_REDIRECT_URI", "GOOGLE_REDIRECT_URI"],
        )
        .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
        let scopes = optional_lookup_value(&lookup, &["KNOB_JOINER_GOOGLE_SCOPES", "GOOGLE_SCOPES"])
            .map(|raw| parse_scope_list(&raw))
            .filter(|scopes| !scopes.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_SCOPE.to_string()]);

        Ok(Self::new(client_id, client_secret, redirect_uri, scopes))
    }
}

fn required_lookup_value<F>(lookup: &F, keys: &[&str], field_name: &str) -> Result<String, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_lookup_value(lookup, keys).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "missing {} (set one of: {})",
            field_name,
            keys.join(", ")
        ))
    })
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn parse_scope_list(raw: &str) -> Vec<String> {
    raw.split([',', ' ', '\n', '\t'])
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureTokenResult {
    Existing(OAuthToken),
    Refreshed(OAuthToken),
    ReauthenticationRequired,
}

#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, InfraError>;
}

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct OAuthManager<S, E>
where
    S: CredentialStore,
    E: TokenEndpoint,
{
    config: OAuthConfig,
    credential_store: Arc<S>,
    token_endpoint: Arc<E>,
    now_provider: NowProvider,
}

impl<S, E> OAuthManager<S, E>
where
    S: CredentialStore,
    E: TokenEndpoint,
{
    pub fn new(config: OAuthConfig, credential_store: Arc<S>, token_endpoint: Arc<E>) -> Self {
        Self {
            config,
            credential_store,
            token_endpoint,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn build_authorization_url(&self, state: &str) -> Result<String, InfraError> {
        if state.trim().is_empty() {
            return Err(InfraError::OAuth("state must not be empty".to_string()));
        }
        if self.config.scopes.is_empty() {
            return Err(InfraError::OAuth("at least one scope is required".to_string()));
        }

        let mut url = Url::parse(&self.config.authorization_endpoint)
            .map_err(|error| InfraError::OAuth(format!("invalid authorization endpoint: {error}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);

        Ok(url.to_string())
    }

    pub async fn authenticate_with_code(&self, authorization_code: &str) -> Result<OAuthToken, InfraError> {
        let code = authorization_code.trim();
        if code.is_empty() {
            return Err(InfraError::OAuth("authorization code must not be empty".to_string()));
        }

        let response = self
            .request(TokenGrant::AuthorizationCode {
                code: code.to_string(),
                redirect_uri: self.config.redirect_uri.clone(),
            })
            .await?;
        let token = self.token_from_response(response, None);
        self.credential_store.save_token(&token)?;
        tracing::info!(expires_at = %token.expires_at, "Authentication successful");
        Ok(token)
    }

    pub async fn ensure_access_token(&self) -> Result<EnsureTokenResult, InfraError> {
        let Some(stored) = self.credential_store.load_token()? else {
            return Ok(EnsureTokenResult::ReauthenticationRequired);
        };

        if stored.is_valid_at((self.now_provider)(), TOKEN_LEEWAY_SECONDS) {
            return Ok(EnsureTokenResult::Existing(stored));
        }

        let Some(refresh_token) = stored.refresh_token.clone() else {
            return Ok(EnsureTokenResult::ReauthenticationRequired);
        };

        match self.request(TokenGrant::RefreshToken { refresh_token }).await {
            Ok(response) => {
                let token = self.token_from_response(response, stored.refresh_token);
                self.credential_store.save_token(&token)?;
                tracing::debug!(expires_at = %token.expires_at, "refreshed access token");
                Ok(EnsureTokenResult::Refreshed(token))
            }
            Err(InfraError::OAuth(reason)) => {
                tracing::warn!(%reason, "token refresh rejected");
                Ok(EnsureTokenResult::ReauthenticationRequired)
            }
            Err(error) => Err(error),
        }
    }

    pub fn clear_stored_token(&self) -> Result<(), InfraError> {
        self.credential_store.delete_token()
    }

    async fn request(&self, grant: TokenGrant) -> Result<TokenEndpointResponse, InfraError> {
        self.token_endpoint
            .request_token(TokenEndpointRequest {
                token_endpoint: self.config.token_endpoint.clone(),
                client_id: self.config.client_id.clone(),
                client_secret: self.config.client_secret.clone(),
                grant,
            })
            .await
    }

    fn token_from_response(
        &self,
        response: TokenEndpointResponse,
        fallback_refresh_token: Option<String>,
    ) -> OAuthToken {
        OAuthToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(fallback_refresh_token),
            expires_at: (self.now_provider)() + Duration::seconds(response.expires_in.max(0)),
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: response.scope,
        }
    }
}

#[async_trait]
impl<S, E> AccessTokenProvider for OAuthManager<S, E>
where
    S: CredentialStore,
    E: TokenEndpoint,
{
    async fn access_token(&self) -> Result<String, InfraError> {
        match self.ensure_access_token().await {
            Ok(EnsureTokenResult::Existing(token) | EnsureTokenResult::Refreshed(token)) => {
                Ok(token.access_token)
            }
            Ok(EnsureTokenResult::ReauthenticationRequired) => Err(InfraError::Auth(
                "google authentication required; run `knob-joiner auth`".to_string(),
            )),
            Err(error @ InfraError::Auth(_)) => Err(error),
            Err(error) => Err(InfraError::Auth(error.to_string())),
        }
    }
}
