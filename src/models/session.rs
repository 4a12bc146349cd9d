//! Session handle and flow-level value types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authenticated principal as reported by the identity provider.
///
/// The flow core only triggers creation of this value and reacts to its
/// presence; persisting it is the provider client's job.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSession {
    pub user_id: String,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ResolvedSession {
    /// Whether the access token is past its expiry
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Email for display, falling back to the user id
    #[must_use]
    pub fn display_identity(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.user_id)
    }
}

impl fmt::Debug for ResolvedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSession")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Purpose of a callback flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowIntent {
    SignIn,
    PasswordRecovery,
}

impl FlowIntent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SignIn => "sign_in",
            Self::PasswordRecovery => "password_recovery",
        }
    }
}

/// Which signal produced the classified intent, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentSource {
    FlowParameter,
    TypeHint,
    PersistedFlag,
    Default,
}

/// Where a finished callback flow sends the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    AppRoot,
    PasswordChange,
    SignIn {
        error_code: String,
        message: String,
    },
}

/// Session lifecycle notifications published by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(ResolvedSession),
    PasswordRecovery(ResolvedSession),
    UserUpdated(ResolvedSession),
    SignedOut,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expires_at: Option<DateTime<Utc>>) -> ResolvedSession {
        ResolvedSession {
            user_id: "user-1".to_string(),
            email: None,
            access_token: "access".to_string(),
            refresh_token: None,
            expires_at,
        }
    }

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        assert!(!session(None).is_expired_at(now));
        assert!(!session(Some(now + Duration::minutes(5))).is_expired_at(now));
        assert!(session(Some(now - Duration::seconds(1))).is_expired_at(now));
    }

    #[test]
    fn test_display_identity_falls_back_to_user_id() {
        let mut s = session(None);
        assert_eq!(s.display_identity(), "user-1");
        s.email = Some("a@example.com".to_string());
        assert_eq!(s.display_identity(), "a@example.com");
    }

    #[test]
    fn test_debug_hides_tokens() {
        let rendered = format!("{:?}", session(None));
        assert!(!rendered.contains("access"));
    }
}
