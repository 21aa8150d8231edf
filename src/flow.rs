use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use time::OffsetDateTime;
use url::Url;

use crate::error::AuthError;
use crate::principal::Principal;
use crate::provider::IdentityProvider;
use crate::session::{AuthState, PendingAuthorization, Session, SessionId, SessionStore};

/// Generates a cryptographically random anti-replay `state` parameter.
///
/// Returns a 22-character URL-safe string (16 random bytes → base64url).
fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// The authentication flow controller.
///
/// Drives the per-session state machine `ANONYMOUS → PENDING →
/// AUTHENTICATED` (back to `ANONYMOUS` on logout or callback failure).
/// Every operation takes the session id explicitly; nothing here relies on
/// ambient per-request state.
pub struct AuthFlow<P, S> {
    provider: Arc<P>,
    store: Arc<S>,
}

// Manual Clone: avoid derive adding `P: Clone, S: Clone` bounds.
impl<P, S> Clone for AuthFlow<P, S> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            store: self.store.clone(),
        }
    }
}

impl<P: IdentityProvider, S: SessionStore> AuthFlow<P, S> {
    pub fn new(provider: Arc<P>, store: Arc<S>) -> Self {
        Self { provider, store }
    }

    /// The session store this controller writes to.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Start a login: generate a fresh `state` token, record the pending
    /// authorization against the session, and return the provider redirect
    /// URL. Allowed from any state — re-login replaces whatever was there.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SessionStoreUnavailable`] if the session cannot
    /// be persisted.
    pub async fn initiate_login(
        &self,
        id: &SessionId,
        scopes: &[String],
    ) -> Result<Url, AuthError> {
        let mut session = self
            .store
            .get(id)
            .await
            .map_err(AuthError::store)?
            .unwrap_or_default();

        let state = generate_state();
        let url = self.provider.build_authorization_url(&state, scopes);

        session.auth = AuthState::Pending(PendingAuthorization {
            state,
            scopes: scopes.to_vec(),
            issued_at: OffsetDateTime::now_utc(),
        });
        self.store
            .save(id, session)
            .await
            .map_err(AuthError::store)?;

        tracing::info!(session_id = %id, "Starting authentication flow");
        Ok(url)
    }

    /// Handle the provider callback. Each step is a hard gate; any failure
    /// aborts with a typed error and leaves the session anonymous. Exactly
    /// one token-exchange + userinfo round-trip pair per call, no retries —
    /// a failed attempt requires the user to restart at login.
    ///
    /// # Errors
    ///
    /// [`AuthError::StateMismatch`] if nothing is pending (never initiated,
    /// or callback replayed) or the `state` differs,
    /// [`AuthError::TokenExchangeFailed`] / [`AuthError::UserInfoFetchFailed`]
    /// for provider failures, [`AuthError::InvalidPrincipal`] when the
    /// claims lack a subject.
    pub async fn complete_login(
        &self,
        id: &SessionId,
        code: &str,
        state: &str,
    ) -> Result<Principal, AuthError> {
        // Single-use consumption: the pending authorization is cleared here,
        // atomically, so a replayed callback finds nothing to match against.
        let pending = self
            .store
            .take_pending(id)
            .await
            .map_err(AuthError::store)?
            .ok_or(AuthError::StateMismatch)?;

        if pending.state != state {
            tracing::warn!(session_id = %id, "OAuth state mismatch");
            return Err(AuthError::StateMismatch);
        }

        let token = self.provider.exchange_code(code).await.map_err(|e| {
            tracing::error!(error = %e, "Token exchange failed");
            AuthError::TokenExchangeFailed(e.to_string())
        })?;

        let claims = self.provider.fetch_user_info(&token).await.map_err(|e| {
            tracing::error!(error = %e, "Userinfo request failed");
            AuthError::UserInfoFetchFailed(e.to_string())
        })?;

        let principal = Principal::try_from(claims)?;

        let mut session = self
            .store
            .get(id)
            .await
            .map_err(AuthError::store)?
            .unwrap_or_else(Session::new);
        session.auth = AuthState::Authenticated(principal.clone());
        self.store
            .save(id, session)
            .await
            .map_err(AuthError::store)?;

        tracing::info!(session_id = %id, subject = %principal.subject, "OAuth2 login successful");
        Ok(principal)
    }

    /// Discard a pending authorization after a provider-reported error or a
    /// malformed callback, returning the session to anonymous.
    pub async fn cancel_login(&self, id: &SessionId) {
        if let Err(e) = self.store.take_pending(id).await {
            tracing::warn!(error = %e, session_id = %id, "Failed to clear pending authorization");
        }
    }

    /// Unconditional transition to anonymous. Idempotent; store failures
    /// are logged and swallowed so logout always appears to succeed.
    pub async fn logout(&self, id: &SessionId) {
        match self.store.get(id).await {
            Ok(Some(mut session)) => {
                session.auth = AuthState::Anonymous;
                if let Err(e) = self.store.save(id, session).await {
                    tracing::warn!(error = %e, session_id = %id, "Session save failed during logout");
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, session_id = %id, "Session lookup failed during logout");
            }
        }
    }

    /// True iff the session is authenticated and unexpired. Pure read.
    pub async fn is_authenticated(&self, id: &SessionId) -> bool {
        self.principal(id).await.is_some()
    }

    /// Current principal, if the session is authenticated and unexpired.
    pub async fn principal(&self, id: &SessionId) -> Option<Principal> {
        match self.store.get(id).await {
            Ok(Some(session)) => match session.auth {
                AuthState::Authenticated(principal) => Some(principal),
                _ => None,
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, session_id = %id, "Session lookup failed");
                None
            }
        }
    }
}
