use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Raw userinfo document as returned by the provider.
///
/// Well-known claims are lifted into fields; anything else lands in `extra`
/// so the debug view can show the full claim set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The authenticated user's claims. Immutable for the lifetime of a login;
/// a new login replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable unique identifier (`sub` claim). The only required field.
    pub subject: String,
    pub preferred_username: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Group memberships, in the order the provider returned them.
    pub groups: Vec<String>,
}

impl Principal {
    /// Human-readable label: `name`, falling back to `preferred_username`,
    /// falling back to the subject.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.preferred_username.as_deref())
            .unwrap_or(&self.subject)
    }
}

impl TryFrom<RawClaims> for Principal {
    type Error = AuthError;

    fn try_from(claims: RawClaims) -> Result<Self, Self::Error> {
        let subject = claims
            .sub
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::InvalidPrincipal("missing `sub` claim".into()))?;

        Ok(Self {
            subject,
            preferred_username: claims.preferred_username,
            display_name: claims.name,
            email: claims.email,
            groups: claims.groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: serde_json::Value) -> RawClaims {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn principal_from_full_claims() {
        let principal = Principal::try_from(claims(json!({
            "sub": "u1",
            "preferred_username": "user1",
            "name": "User One",
            "email": "u1@example.com",
            "groups": ["admins", "users"],
        })))
        .unwrap();

        assert_eq!(principal.subject, "u1");
        assert_eq!(principal.label(), "User One");
        assert_eq!(principal.email.as_deref(), Some("u1@example.com"));
        assert_eq!(principal.groups, vec!["admins", "users"]);
    }

    #[test]
    fn principal_requires_subject() {
        let err = Principal::try_from(claims(json!({"email": "u1@example.com"}))).unwrap_err();
        assert!(matches!(err, AuthError::InvalidPrincipal(_)));

        let err = Principal::try_from(claims(json!({"sub": ""}))).unwrap_err();
        assert!(matches!(err, AuthError::InvalidPrincipal(_)));
    }

    #[test]
    fn principal_label_fallback_chain() {
        let only_sub = Principal::try_from(claims(json!({"sub": "u1"}))).unwrap();
        assert_eq!(only_sub.label(), "u1");

        let with_username = Principal::try_from(claims(json!({
            "sub": "u1",
            "preferred_username": "user1",
        })))
        .unwrap();
        assert_eq!(with_username.label(), "user1");
    }

    #[test]
    fn unknown_claims_are_retained() {
        let raw = claims(json!({"sub": "u1", "locale": "en", "nickname": "u"}));
        assert_eq!(raw.extra.len(), 2);
        assert_eq!(raw.extra["locale"], json!("en"));
    }

    #[test]
    fn group_order_is_preserved() {
        let raw = claims(json!({"sub": "u1", "groups": ["c", "a", "b"]}));
        let principal = Principal::try_from(raw).unwrap();
        assert_eq!(principal.groups, vec!["c", "a", "b"]);
    }
}
