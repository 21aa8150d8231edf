use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};

/// Errors surfaced by the authentication flow.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Callback `state` does not match the pending authorization, or no
    /// authorization is pending for this session (including replays).
    #[error("authorization state mismatch")]
    StateMismatch,

    /// Token endpoint round-trip failed or returned non-2xx.
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// Userinfo endpoint round-trip failed or returned non-2xx.
    #[error("userinfo fetch failed: {0}")]
    UserInfoFetchFailed(String),

    /// Userinfo response is missing required claims.
    #[error("invalid principal: {0}")]
    InvalidPrincipal(String),

    /// Session store operation failed.
    #[error("session store unavailable: {0}")]
    SessionStoreUnavailable(String),

    /// Missing or invalid startup configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AuthError {
    pub(crate) fn store(err: impl std::fmt::Display) -> Self {
        Self::SessionStoreUnavailable(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::StateMismatch
            | Self::TokenExchangeFailed(_)
            | Self::UserInfoFetchFailed(_)
            | Self::InvalidPrincipal(_) => {
                // Detail is logged, never rendered to the browser.
                tracing::warn!(error = %self, "Authentication failed");
                Redirect::to("/error").into_response()
            }
            Self::SessionStoreUnavailable(_) | Self::Config(_) => {
                tracing::error!(error = %self, "Auth internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}
