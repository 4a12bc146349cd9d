//! Pre-built test data

use crate::models::{EntitlementRecord, ResolvedSession, Tier};
use crate::settings::{AuthgateSettings, ProtectedView};
use chrono::{Duration, Utc};

use super::constants::{TEST_EMAIL, TEST_SESSION_SECRET, TEST_USER_ID};

pub struct TestFixtures;

impl TestFixtures {
    /// Session for the default test user, valid for an hour
    #[must_use]
    pub fn session() -> ResolvedSession {
        Self::session_for(TEST_USER_ID, TEST_EMAIL)
    }

    #[must_use]
    pub fn session_for(user_id: &str, email: &str) -> ResolvedSession {
        ResolvedSession {
            user_id: user_id.to_string(),
            email: Some(email.to_string()),
            access_token: format!("access-{user_id}"),
            refresh_token: Some(format!("refresh-{user_id}")),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        }
    }

    #[must_use]
    pub fn entitlement(tier: Tier) -> EntitlementRecord {
        EntitlementRecord {
            tier,
            status: "active".to_string(),
        }
    }

    /// Settings with a fixed secret, insecure cookies and two protected views
    #[must_use]
    pub fn settings() -> AuthgateSettings {
        let mut settings = AuthgateSettings::default();
        settings.session.session_secret = TEST_SESSION_SECRET.to_string();
        settings.cookies.secure = false;
        settings.protected_views = vec![
            ProtectedView {
                name: "dashboard".to_string(),
                title: "Dashboard".to_string(),
                requires: None,
            },
            ProtectedView {
                name: "reports".to_string(),
                title: "Reports".to_string(),
                requires: Some(Tier::Pro),
            },
        ];
        settings
    }
}
