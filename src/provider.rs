use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::config::ProviderConfig;
use crate::principal::RawClaims;

/// Errors from the two provider round-trips.
///
/// Ambiguous outcomes (timeouts, connection errors, unexpected bodies) are
/// failures; there is no implicit-success path.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} returned status {status}: {detail}")]
    Endpoint {
        operation: &'static str,
        status: u16,
        detail: String,
    },
}

/// Access token response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// The three OAuth2 operations the flow controller needs from a provider.
///
/// Stateless; one network call per token/userinfo operation, no retries.
/// Retry policy, if any, belongs to the caller.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Build the authorization redirect URL. Pure string construction,
    /// no network call.
    fn build_authorization_url(&self, state: &str, scopes: &[String]) -> Url;

    /// Exchange an authorization code for an access token.
    fn exchange_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<AccessToken, ProviderError>> + Send;

    /// Fetch the userinfo document using a bearer token.
    fn fetch_user_info(
        &self,
        token: &AccessToken,
    ) -> impl Future<Output = Result<RawClaims, ProviderError>> + Send;
}

/// Bound on each provider call so a hung endpoint cannot stall the callback
/// handler indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Reqwest-backed [`IdentityProvider`].
pub struct ProviderClient {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl ProviderClient {
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client with static configuration");
        Self { config, http }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Checks HTTP response status; returns the response on success or an
    /// error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, ProviderError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        Err(ProviderError::Endpoint {
            operation,
            status,
            detail,
        })
    }
}

impl IdentityProvider for ProviderClient {
    fn build_authorization_url(&self, state: &str, scopes: &[String]) -> Url {
        let mut url = self.config.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.callback_url.as_str())
            .append_pair("state", state)
            .append_pair("scope", &scopes.join(" "));
        url
    }

    async fn exchange_code(&self, code: &str) -> Result<AccessToken, ProviderError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.callback_url.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(self.config.token_endpoint.clone())
            .form(&params)
            .send()
            .await?;

        let response = Self::ensure_success(response, "token exchange").await?;
        response.json::<AccessToken>().await.map_err(Into::into)
    }

    async fn fetch_user_info(&self, token: &AccessToken) -> Result<RawClaims, ProviderError> {
        let response = self
            .http
            .get(self.config.userinfo_endpoint.clone())
            .bearer_auth(&token.access_token)
            .send()
            .await?;

        let response = Self::ensure_success(response, "userinfo request").await?;
        response.json::<RawClaims>().await.map_err(Into::into)
    }
}
