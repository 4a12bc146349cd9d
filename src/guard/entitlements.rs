//! Entitlement lookups for the route guard

use crate::models::{EntitlementRecord, ResolvedSession};
use crate::settings::ProviderSettings;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single entitlement lookup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntitlementError {
    /// Network or availability problem; the same lookup may succeed later
    #[error("entitlement lookup temporarily failed: {0}")]
    Transient(String),
    /// Retrying will not help (malformed response, refused credentials)
    #[error("entitlement lookup failed: {0}")]
    Fatal(String),
}

impl EntitlementError {
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Where the guard reads a user's subscription record from
#[async_trait]
pub trait EntitlementSource: Send + Sync {
    /// Current record for the session's user; `Ok(None)` when the user has none
    ///
    /// # Errors
    ///
    /// Returns a classified [`EntitlementError`] when the lookup fails.
    async fn fetch_entitlement(
        &self,
        session: &ResolvedSession,
    ) -> Result<Option<EntitlementRecord>, EntitlementError>;
}

/// PostgREST-style entitlement table reached over HTTP
#[derive(Clone)]
pub struct RestEntitlementSource {
    http_client: reqwest::Client,
    rest_url: String,
    table: String,
    api_key: String,
}

impl RestEntitlementSource {
    /// Build a source from provider settings
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(settings: &ProviderSettings) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()?;
        Ok(Self::with_http_client(
            http_client,
            &settings.rest_url,
            &settings.entitlement_table,
            &settings.get_api_key().unwrap_or_default(),
        ))
    }

    #[must_use]
    pub fn with_http_client(
        http_client: reqwest::Client,
        rest_url: &str,
        table: &str,
        api_key: &str,
    ) -> Self {
        Self {
            http_client,
            rest_url: rest_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl EntitlementSource for RestEntitlementSource {
    async fn fetch_entitlement(
        &self,
        session: &ResolvedSession,
    ) -> Result<Option<EntitlementRecord>, EntitlementError> {
        let url = format!("{}/{}", self.rest_url, self.table);
        let user_filter = format!("eq.{}", session.user_id);
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("select", "tier,status"),
                ("user_id", user_filter.as_str()),
                ("limit", "1"),
            ])
            .header("apikey", &self.api_key)
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(|e| EntitlementError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("entitlement table returned {status}");
            return Err(if is_transient_status(status) {
                EntitlementError::Transient(message)
            } else {
                EntitlementError::Fatal(message)
            });
        }

        let records: Vec<EntitlementRecord> = response
            .json()
            .await
            .map_err(|e| EntitlementError::Fatal(format!("malformed entitlement response: {e}")))?;
        Ok(records.into_iter().next())
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
    }
}
