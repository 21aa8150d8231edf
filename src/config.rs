use axum_extra::extract::cookie::Key;
use url::Url;

use crate::error::AuthError;

/// Immutable identity-provider configuration: the three OAuth2 endpoints
/// plus client credentials. Constructed once at startup and injected into
/// the provider client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub userinfo_endpoint: Url,
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URI registered with the provider.
    pub callback_url: Url,
}

impl ProviderConfig {
    /// Derive the three endpoints from an Authentik base URL
    /// (`{base}/application/o/{authorize,token,userinfo}/`).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the base URL does not parse.
    pub fn from_authentik_base(
        base_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        callback_url: Url,
    ) -> Result<Self, AuthError> {
        let base = base_url.trim_end_matches('/');
        let endpoint = |path: &str| -> Result<Url, AuthError> {
            format!("{base}/application/o/{path}/")
                .parse()
                .map_err(|e| AuthError::Config(format!("AUTHENTIK_URL: {e}")))
        };

        Ok(Self {
            authorization_endpoint: endpoint("authorize")?,
            token_endpoint: endpoint("token")?,
            userinfo_endpoint: endpoint("userinfo")?,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            callback_url,
        })
    }
}

/// Application configuration assembled from the environment at startup.
#[derive(Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    /// Key for the encrypted session cookie, from `SESSION_SECRET`.
    pub cookie_key: Key,
    pub scopes: Vec<String>,
    pub port: u16,
    pub secure_cookies: bool,
}

const DEFAULT_CALLBACK_URL: &str = "http://localhost:3000/auth/callback";
const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "email"];
const DEFAULT_PORT: u16 = 3000;

impl AppConfig {
    /// Create configuration from environment variables.
    ///
    /// # Required env vars
    /// - `AUTHENTIK_URL`: identity-provider base URL
    /// - `CLIENT_ID`: OAuth2 client ID
    /// - `CLIENT_SECRET`: OAuth2 client secret
    /// - `SESSION_SECRET`: cookie encryption key material (at least 64 bytes)
    ///
    /// # Optional env vars
    /// - `CALLBACK_URL`: OAuth2 redirect URI (default `http://localhost:3000/auth/callback`)
    /// - `SCOPES`: comma-separated OAuth2 scopes (default `openid,profile,email`)
    /// - `PORT`: listen port (default 3000)
    /// - `SECURE_COOKIES`: set to `1` or `true` to mark cookies Secure
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if a required variable is missing or a
    /// value is invalid. Startup must fail rather than proceed with
    /// placeholder values.
    pub fn from_env() -> Result<Self, AuthError> {
        let base_url = require("AUTHENTIK_URL")?;
        let client_id = require("CLIENT_ID")?;
        let client_secret = require("CLIENT_SECRET")?;
        let session_secret = require("SESSION_SECRET")?;

        let cookie_key = Key::try_from(session_secret.as_bytes()).map_err(|_| {
            AuthError::Config("SESSION_SECRET must be at least 64 bytes".into())
        })?;

        let callback_url: Url = std::env::var("CALLBACK_URL")
            .unwrap_or_else(|_| DEFAULT_CALLBACK_URL.into())
            .parse()
            .map_err(|e| AuthError::Config(format!("CALLBACK_URL: {e}")))?;

        let provider =
            ProviderConfig::from_authentik_base(&base_url, client_id, client_secret, callback_url)?;

        let scopes = match std::env::var("SCOPES") {
            Ok(raw) => raw.split(',').map(|s| s.trim().to_string()).collect(),
            Err(_) => DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect(),
        };

        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| AuthError::Config(format!("PORT: {e}")))?,
            Err(_) => DEFAULT_PORT,
        };

        let secure_cookies = matches!(
            std::env::var("SECURE_COOKIES").as_deref(),
            Ok("1") | Ok("true")
        );

        Ok(Self {
            provider,
            cookie_key,
            scopes,
            port,
            secure_cookies,
        })
    }
}

fn require(name: &'static str) -> Result<String, AuthError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::Config(format!("{name} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_derived_from_base_url() {
        let config = ProviderConfig::from_authentik_base(
            "https://auth.example.com",
            "client",
            "secret",
            "http://localhost:3000/auth/callback".parse().unwrap(),
        )
        .unwrap();

        assert_eq!(
            config.authorization_endpoint.as_str(),
            "https://auth.example.com/application/o/authorize/"
        );
        assert_eq!(
            config.token_endpoint.as_str(),
            "https://auth.example.com/application/o/token/"
        );
        assert_eq!(
            config.userinfo_endpoint.as_str(),
            "https://auth.example.com/application/o/userinfo/"
        );
    }

    #[test]
    fn trailing_slash_on_base_url_is_tolerated() {
        let config = ProviderConfig::from_authentik_base(
            "https://auth.example.com/",
            "client",
            "secret",
            "http://localhost:3000/auth/callback".parse().unwrap(),
        )
        .unwrap();

        assert_eq!(
            config.authorization_endpoint.as_str(),
            "https://auth.example.com/application/o/authorize/"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = ProviderConfig::from_authentik_base(
            "not a url",
            "client",
            "secret",
            "http://localhost:3000/auth/callback".parse().unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }
}
