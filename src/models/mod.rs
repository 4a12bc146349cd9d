//! Data model shared by the callback flow, the route guard and the HTTP layer

pub mod credential;
pub mod entitlement;
pub mod session;

pub use credential::{IncomingCredential, OpaqueTokenKind, OtpType, PKCE_TOKEN_PREFIX};
pub use entitlement::{EntitlementRecord, Tier};
pub use session::{FlowIntent, IntentSource, ResolvedSession, Route, SessionEvent};

use serde::Serialize;

/// Health check response body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}
