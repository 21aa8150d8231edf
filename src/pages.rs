//! Inline HTML pages. Deliberately plain: this app exists to exercise the
//! login flow, not to look good doing it.

use axum::response::Html;

use crate::principal::Principal;

const STYLE: &str = "body{font-family:Arial,sans-serif;max-width:700px;margin:60px auto;padding:20px}\
.box{padding:20px;border-radius:5px;margin:20px 0}\
.success{background:#d4edda;border:1px solid #c3e6cb}\
.info{background:#f8f9fa;border:1px solid #dee2e6}\
.error{background:#f8d7da;border:1px solid #f5c6cb;color:#721c24}\
a.btn{display:inline-block;color:#fff;padding:10px 20px;text-decoration:none;border-radius:5px;margin-right:10px}\
a.login{background:#28a745}a.logout{background:#dc3545}a.protected{background:#007bff}a.retry{background:#007bff}";

/// Minimal HTML escaping for interpolated claim values.
fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn home_authenticated(principal: &Principal) -> Html<String> {
    let groups = if principal.groups.is_empty() {
        "None".to_string()
    } else {
        escape(&principal.groups.join(", "))
    };
    let raw = serde_json::to_string_pretty(principal).unwrap_or_default();

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>OAuth2 Test - Success</title><style>{STYLE}</style></head>
<body>
  <div class="box success">
    <h1>Authentication successful</h1>
    <p>Your identity provider configuration is working.</p>
  </div>
  <div class="box info">
    <h2>User information</h2>
    <p><strong>Name:</strong> {name}</p>
    <p><strong>Email:</strong> {email}</p>
    <p><strong>Username:</strong> {username}</p>
    <p><strong>User ID:</strong> {subject}</p>
    <p><strong>Groups:</strong> {groups}</p>
  </div>
  <div>
    <a href="/protected" class="btn protected">Test protected route</a>
    <a href="/logout" class="btn logout">Logout</a>
  </div>
  <div style="margin-top:30px;font-size:12px;color:#666">
    <h3>Debug</h3>
    <pre>{raw}</pre>
  </div>
</body>
</html>"#,
        name = escape(principal.label()),
        email = escape(principal.email.as_deref().unwrap_or("Not provided")),
        username = escape(
            principal
                .preferred_username
                .as_deref()
                .unwrap_or("Not provided")
        ),
        subject = escape(&principal.subject),
        raw = escape(&raw),
    ))
}

pub fn home_anonymous() -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>OAuth2 Test App</title><style>{STYLE}</style></head>
<body>
  <h1>OAuth2 Test Application</h1>
  <div class="box info">
    <p>This application tests OAuth2 Authorization Code login against your identity provider.</p>
  </div>
  <a href="/auth/login" class="btn login">Login</a>
</body>
</html>"#
    ))
}

pub fn error_page() -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Authentication Error</title><style>{STYLE}</style></head>
<body>
  <div class="box error">
    <h1>Authentication failed</h1>
    <p>There was an error during the authentication process.</p>
    <p>Please check your identity provider configuration and try again.</p>
  </div>
  <a href="/" class="btn retry">Try again</a>
</body>
</html>"#
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_values_are_escaped() {
        let principal = Principal {
            subject: "u1".into(),
            preferred_username: None,
            display_name: Some("<script>alert(1)</script>".into()),
            email: None,
            groups: vec![],
        };
        let Html(body) = home_authenticated(&principal);
        assert!(!body.contains("<script>alert"));
        assert!(body.contains("&lt;script&gt;"));
    }

    #[test]
    fn anonymous_page_links_to_login() {
        let Html(body) = home_anonymous();
        assert!(body.contains(r#"href="/auth/login""#));
    }
}
