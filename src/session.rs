use std::collections::HashMap;
use std::future::Future;

use derive_more::{Display, From, Into};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use ulid::Ulid;

use crate::principal::Principal;

/// Opaque session identifier carried in the cookie (ULID format).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    fn generate() -> Self {
        Self(Ulid::new().to_string())
    }
}

/// Ephemeral record for an in-flight authorization request.
///
/// Created by login initiation, consumed exactly once when the callback
/// arrives; a replayed callback finds nothing to consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    /// Anti-replay `state` parameter echoed back by the provider.
    pub state: String,
    pub scopes: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
}

/// Per-session authentication state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum AuthState {
    #[default]
    Anonymous,
    Pending(PendingAuthorization),
    Authenticated(Principal),
}

impl AuthState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Pending(_) => "pending",
            Self::Authenticated(_) => "authenticated",
        }
    }
}

/// Sessions expire a fixed interval after creation.
pub const SESSION_TTL: Duration = Duration::hours(24);

/// Server-side session record tied to a browser via the cookie-carried id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub auth: AuthState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            auth: AuthState::Anonymous,
            created_at: now,
            expires_at: now + SESSION_TTL,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Session persistence required by the flow controller.
///
/// Implementations must serialize reads and writes per session id, and
/// `save` must complete before the HTTP response that triggered it is sent —
/// no fire-and-forget writes.
pub trait SessionStore: Send + Sync + 'static {
    /// Create a fresh anonymous session.
    fn create(&self) -> impl Future<Output = Result<(SessionId, Session), StoreError>> + Send;

    /// Look up a session by id. Expired sessions read as absent.
    fn get(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<Option<Session>, StoreError>> + Send;

    /// Persist a session record, replacing any previous value for the id.
    fn save(
        &self,
        id: &SessionId,
        session: Session,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove a session.
    fn destroy(&self, id: &SessionId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Atomically take the pending authorization, leaving the session
    /// anonymous. Returns `None` when nothing is pending — which is exactly
    /// what a second consumer of the same callback observes.
    fn take_pending(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<Option<PendingAuthorization>, StoreError>> + Send;
}

/// In-memory [`SessionStore`].
///
/// One mutex over the whole map serializes per-key updates, which is all a
/// single-process demo needs. Expired entries are dropped on read.
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    async fn create(&self) -> Result<(SessionId, Session), StoreError> {
        let id = SessionId::generate();
        let session = Session::new();
        self.sessions.lock().insert(id.clone(), session.clone());
        Ok((id, session))
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.sessions.lock();
        if sessions.get(id).is_some_and(|s| s.is_expired()) {
            sessions.remove(id);
            return Ok(None);
        }
        Ok(sessions.get(id).cloned())
    }

    async fn save(&self, id: &SessionId, session: Session) -> Result<(), StoreError> {
        self.sessions.lock().insert(id.clone(), session);
        Ok(())
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), StoreError> {
        self.sessions.lock().remove(id);
        Ok(())
    }

    async fn take_pending(
        &self,
        id: &SessionId,
    ) -> Result<Option<PendingAuthorization>, StoreError> {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(id) else {
            return Ok(None);
        };
        if session.is_expired() {
            sessions.remove(id);
            return Ok(None);
        }
        // Check-and-clear under the lock; only a Pending state is consumed.
        match std::mem::take(&mut session.auth) {
            AuthState::Pending(pending) => Ok(Some(pending)),
            other => {
                session.auth = other;
                Ok(None)
            }
        }
    }
}
