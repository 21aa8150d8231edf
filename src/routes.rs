use axum::extract::{FromRef, Query, State};
use axum::response::{Html, IntoResponse, Json, Redirect, Response};
use axum::routing::get;
use axum::Router;
use axum_extra::extract::cookie::{Cookie, Key, SameSite};
use axum_extra::extract::PrivateCookieJar;
use serde::Deserialize;
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::AuthError;
use crate::flow::AuthFlow;
use crate::pages;
use crate::provider::IdentityProvider;
use crate::session::{SessionId, SessionStore, SESSION_TTL};

const SESSION_COOKIE: &str = "__authentik_demo";

/// Routing-level settings split out of [`crate::config::AppConfig`].
#[derive(Clone)]
pub struct RouterConfig {
    /// Key for the encrypted session cookie.
    pub cookie_key: Key,
    /// Scopes requested at login initiation.
    pub scopes: Vec<String>,
    pub secure_cookies: bool,
}

/// Shared state for the route handlers.
pub struct AppState<P, S> {
    flow: AuthFlow<P, S>,
    settings: RouterConfig,
}

// Manual Clone: avoid derive adding `P: Clone, S: Clone` bounds.
impl<P, S> Clone for AppState<P, S> {
    fn clone(&self) -> Self {
        Self {
            flow: self.flow.clone(),
            settings: self.settings.clone(),
        }
    }
}

// PrivateCookieJar requires Key to be extractable from state.
impl<P: IdentityProvider, S: SessionStore> FromRef<AppState<P, S>> for Key {
    fn from_ref(state: &AppState<P, S>) -> Self {
        state.settings.cookie_key.clone()
    }
}

/// Build the application router.
pub fn build_router<P: IdentityProvider, S: SessionStore>(
    config: RouterConfig,
    flow: AuthFlow<P, S>,
) -> Router {
    let state = AppState {
        flow,
        settings: config,
    };

    Router::new()
        .route("/", get(index::<P, S>))
        .route("/auth/login", get(login::<P, S>))
        .route("/auth/callback", get(callback::<P, S>))
        .route("/logout", get(logout::<P, S>))
        .route("/protected", get(protected::<P, S>))
        .route("/debug", get(debug_state::<P, S>))
        .route("/error", get(error_page))
        .with_state(state)
}

// ── Session bootstrap ──────────────────────────────────────────────

fn session_cookie(id: &SessionId, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(SESSION_TTL)
        .build()
}

/// Resolve the session for this request, creating one on first contact or
/// when the cookie references an expired/unknown session.
async fn ensure_session<P: IdentityProvider, S: SessionStore>(
    state: &AppState<P, S>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, SessionId), AuthError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let id = SessionId::from(cookie.value().to_string());
        if state
            .flow
            .store()
            .get(&id)
            .await
            .map_err(AuthError::store)?
            .is_some()
        {
            return Ok((jar, id));
        }
    }

    let (id, _session) = state
        .flow
        .store()
        .create()
        .await
        .map_err(AuthError::store)?;
    let jar = jar.add(session_cookie(&id, state.settings.secure_cookies));
    Ok((jar, id))
}

// ── Handlers ───────────────────────────────────────────────────────

async fn index<P: IdentityProvider, S: SessionStore>(
    State(state): State<AppState<P, S>>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Html<String>), AuthError> {
    let (jar, id) = ensure_session(&state, jar).await?;

    let page = match state.flow.principal(&id).await {
        Some(principal) => pages::home_authenticated(&principal),
        None => pages::home_anonymous(),
    };
    Ok((jar, page))
}

async fn login<P: IdentityProvider, S: SessionStore>(
    State(state): State<AppState<P, S>>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Redirect), AuthError> {
    let (jar, id) = ensure_session(&state, jar).await?;
    let url = state
        .flow
        .initiate_login(&id, &state.settings.scopes)
        .await?;
    Ok((jar, Redirect::to(url.as_str())))
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn callback<P: IdentityProvider, S: SessionStore>(
    State(state): State<AppState<P, S>>,
    jar: PrivateCookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(PrivateCookieJar, Redirect), AuthError> {
    let (jar, id) = ensure_session(&state, jar).await?;

    if let Some(error) = &params.error {
        let desc = params.error_description.as_deref().unwrap_or("Unknown error");
        tracing::warn!(error = %error, description = %desc, "OAuth2 error from provider");
        state.flow.cancel_login(&id).await;
        return Ok((jar, Redirect::to("/error")));
    }

    let (Some(code), Some(received_state)) = (params.code.as_deref(), params.state.as_deref())
    else {
        tracing::warn!("Callback missing code or state parameter");
        state.flow.cancel_login(&id).await;
        return Ok((jar, Redirect::to("/error")));
    };

    state.flow.complete_login(&id, code, received_state).await?;
    Ok((jar, Redirect::to("/")))
}

async fn logout<P: IdentityProvider, S: SessionStore>(
    State(state): State<AppState<P, S>>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Redirect), AuthError> {
    let (jar, id) = ensure_session(&state, jar).await?;
    state.flow.logout(&id).await;
    Ok((jar, Redirect::to("/")))
}

async fn protected<P: IdentityProvider, S: SessionStore>(
    State(state): State<AppState<P, S>>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Response), AuthError> {
    let (jar, id) = ensure_session(&state, jar).await?;

    let Some(principal) = state.flow.principal(&id).await else {
        return Ok((jar, Redirect::to("/auth/login").into_response()));
    };

    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let body = Json(json!({
        "message": "This is a protected route - you are authenticated",
        "timestamp": timestamp,
        "user": {
            "id": principal.subject,
            "name": principal.label(),
            "email": principal.email,
            "groups": principal.groups,
        },
    }));
    Ok((jar, body.into_response()))
}

/// Diagnostic view of the current session. No secrets: the pending `state`
/// token and principal claims are deliberately not included.
async fn debug_state<P: IdentityProvider, S: SessionStore>(
    State(state): State<AppState<P, S>>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Json<serde_json::Value>), AuthError> {
    let (jar, id) = ensure_session(&state, jar).await?;

    let session = state
        .flow
        .store()
        .get(&id)
        .await
        .map_err(AuthError::store)?;

    let body = match session {
        Some(session) => json!({
            "is_authenticated": state.flow.is_authenticated(&id).await,
            "session_id": id,
            "auth_state": session.auth.name(),
            "expires_at": session.expires_at.format(&Rfc3339).unwrap_or_default(),
        }),
        None => json!({
            "is_authenticated": false,
            "session_id": id,
            "auth_state": "anonymous",
            "expires_at": null,
        }),
    };
    Ok((jar, Json(body)))
}

async fn error_page() -> Html<String> {
    pages::error_page()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::RawClaims;
    use crate::provider::{AccessToken, ProviderError};
    use crate::session::MemoryStore;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, HeaderMap, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;
    use url::Url;

    struct StubProvider;

    impl IdentityProvider for StubProvider {
        fn build_authorization_url(&self, state: &str, scopes: &[String]) -> Url {
            let mut url: Url = "https://idp.example.com/authorize".parse().unwrap();
            url.query_pairs_mut()
                .append_pair("state", state)
                .append_pair("scope", &scopes.join(" "));
            url
        }

        async fn exchange_code(&self, _code: &str) -> Result<AccessToken, ProviderError> {
            Ok(AccessToken {
                access_token: "stub-token".into(),
                token_type: "Bearer".into(),
                expires_in: None,
                refresh_token: None,
            })
        }

        async fn fetch_user_info(&self, _token: &AccessToken) -> Result<RawClaims, ProviderError> {
            Ok(serde_json::from_value(json!({
                "sub": "u1",
                "preferred_username": "user1",
                "email": "u1@example.com",
                "groups": ["users"],
            }))
            .unwrap())
        }
    }

    fn test_app() -> Router {
        let flow = AuthFlow::new(Arc::new(StubProvider), Arc::new(MemoryStore::new()));
        build_router(
            RouterConfig {
                cookie_key: Key::generate(),
                scopes: vec!["openid".into()],
                secure_cookies: false,
            },
            flow,
        )
    }

    async fn send(
        app: &Router,
        uri: &str,
        cookies: &[String],
    ) -> (StatusCode, HeaderMap, String) {
        let mut builder = Request::builder().uri(uri);
        if !cookies.is_empty() {
            builder = builder.header(header::COOKIE, cookies.join("; "));
        }
        let response = app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, String::from_utf8_lossy(&body).into_owned())
    }

    fn set_cookies(headers: &HeaderMap) -> Vec<String> {
        headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .map(str::to_string)
            .collect()
    }

    fn location(headers: &HeaderMap) -> &str {
        headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .expect("redirect carries a Location header")
    }

    /// Drive `/auth/login` then `/auth/callback`, returning the session
    /// cookie for follow-up requests.
    async fn log_in(app: &Router) -> Vec<String> {
        let (status, headers, _) = send(app, "/auth/login", &[]).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let cookies = set_cookies(&headers);
        assert!(!cookies.is_empty(), "login should set a session cookie");

        let authorize_url: Url = location(&headers).parse().unwrap();
        let state = authorize_url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let (status, headers, _) = send(
            app,
            &format!("/auth/callback?code=abc&state={state}"),
            &cookies,
        )
        .await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location(&headers), "/");

        cookies
    }

    #[tokio::test]
    async fn index_renders_anonymous_view() {
        let app = test_app();
        let (status, _, body) = send(&app, "/", &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("/auth/login"));
    }

    #[tokio::test]
    async fn index_renders_authenticated_view_after_login() {
        let app = test_app();
        let cookies = log_in(&app).await;

        let (status, _, body) = send(&app, "/", &cookies).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("u1@example.com"));
        assert!(body.contains("Logout"));
    }

    #[tokio::test]
    async fn protected_redirects_anonymous_to_login() {
        let app = test_app();
        let (status, headers, _) = send(&app, "/protected", &[]).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location(&headers), "/auth/login");
    }

    #[tokio::test]
    async fn protected_returns_principal_json_when_authenticated() {
        let app = test_app();
        let cookies = log_in(&app).await;

        let (status, _, body) = send(&app, "/protected", &cookies).await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["user"]["id"], "u1");
        assert_eq!(json["user"]["email"], "u1@example.com");
        assert_eq!(json["user"]["groups"], json!(["users"]));
    }

    #[tokio::test]
    async fn callback_with_wrong_state_redirects_to_error() {
        let app = test_app();
        let (_, headers, _) = send(&app, "/auth/login", &[]).await;
        let cookies = set_cookies(&headers);

        let (status, headers, _) = send(
            &app,
            "/auth/callback?code=abc&state=wrong-state",
            &cookies,
        )
        .await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location(&headers), "/error");
    }

    #[tokio::test]
    async fn replayed_callback_redirects_to_error() {
        let app = test_app();
        let (_, headers, _) = send(&app, "/auth/login", &[]).await;
        let cookies = set_cookies(&headers);
        let authorize_url: Url = location(&headers).parse().unwrap();
        let state = authorize_url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        let callback_uri = format!("/auth/callback?code=abc&state={state}");

        let (status, headers, _) = send(&app, &callback_uri, &cookies).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location(&headers), "/");

        let (status, headers, _) = send(&app, &callback_uri, &cookies).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location(&headers), "/error");
    }

    #[tokio::test]
    async fn callback_with_provider_error_redirects_to_error() {
        let app = test_app();
        let (_, headers, _) = send(&app, "/auth/login", &[]).await;
        let cookies = set_cookies(&headers);

        let (status, headers, _) = send(
            &app,
            "/auth/callback?error=access_denied&error_description=denied",
            &cookies,
        )
        .await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location(&headers), "/error");

        // The pending authorization is gone; a retry needs a fresh login.
        let (_, _, body) = send(&app, "/debug", &cookies).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["auth_state"], "anonymous");
    }

    #[tokio::test]
    async fn logout_clears_session_and_redirects_home() {
        let app = test_app();
        let cookies = log_in(&app).await;

        let (status, headers, _) = send(&app, "/logout", &cookies).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location(&headers), "/");

        let (status, headers, _) = send(&app, "/protected", &cookies).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location(&headers), "/auth/login");
    }

    #[tokio::test]
    async fn debug_reports_authentication_state() {
        let app = test_app();

        let (status, headers, body) = send(&app, "/debug", &[]).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["is_authenticated"], false);
        assert_eq!(json["auth_state"], "anonymous");
        let cookies = set_cookies(&headers);

        let login_cookies = log_in(&app).await;
        let (_, _, body) = send(&app, "/debug", &login_cookies).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["is_authenticated"], true);
        assert_eq!(json["auth_state"], "authenticated");
        assert!(json["session_id"].is_string());

        // The anonymous session from before is untouched.
        let (_, _, body) = send(&app, "/debug", &cookies).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["is_authenticated"], false);
    }

    #[tokio::test]
    async fn error_page_is_served() {
        let app = test_app();
        let (status, _, body) = send(&app, "/error", &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Authentication failed"));
    }

    #[tokio::test]
    async fn session_cookie_is_issued_on_first_contact() {
        let app = test_app();
        let (_, headers, _) = send(&app, "/", &[]).await;
        let cookies = set_cookies(&headers);
        assert!(cookies.iter().any(|c| c.starts_with(SESSION_COOKIE)));

        // Same cookie, no re-issue on the second request.
        let (_, headers, _) = send(&app, "/", &cookies).await;
        assert!(set_cookies(&headers).is_empty());
    }
}
