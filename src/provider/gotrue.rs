//! GoTrue-compatible REST client
//!
//! Implements [`IdentityProvider`] against the `/token`, `/verify`, `/user`,
//! `/recover` and `/logout` endpoints. Provider error shapes are classified
//! here, once, into [`ProviderError`]; nothing above this module inspects
//! status codes or message text.
//!
//! Session persistence belongs to this client. It keeps the active session
//! and the pending PKCE verifier in a [`StoredAuthState`] that the HTTP layer
//! seeds from, and writes back to, the browser's encrypted auth cookie.
//! Clients built with [`GoTrueClient::for_context`] share that state with
//! every other in-flight request of the same browser context.

use crate::error::ProviderError;
use crate::models::{OtpType, ResolvedSession, SessionEvent};
use crate::provider::store::{Attachment, AuthStateStore, SharedState};
use crate::provider::{IdentityProvider, PkcePair};
use crate::settings::ProviderSettings;
use crate::utils::crypto::unverified_jwt_claims;
use crate::utils::logging::LoggingHelper;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use log::{debug, info, warn};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

/// Per-browser state owned by the provider client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAuthState {
    pub session: Option<ResolvedSession>,
    pub code_verifier: Option<String>,
    /// The session came from a password-recovery link and may set a new password
    #[serde(default)]
    pub recovery: bool,
}

impl StoredAuthState {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.session.is_none() && self.code_verifier.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

/// REST client for a GoTrue-compatible identity provider
pub struct GoTrueClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    state: SharedState,
    contexts: Arc<AuthStateStore>,
    _attachment: Option<Attachment>,
    events: broadcast::Sender<SessionEvent>,
}

impl GoTrueClient {
    /// Build a client from provider settings
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(settings: &ProviderSettings) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(settings.request_timeout_ms))
            .build()
            .context("Failed to build identity provider HTTP client")?;
        Ok(Self::with_http_client(
            http_client,
            &settings.base_url,
            &settings.get_api_key().unwrap_or_default(),
        ))
    }

    /// Build a client around an existing `reqwest::Client`
    #[must_use]
    pub fn with_http_client(http_client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            state: Arc::new(Mutex::new(StoredAuthState::default())),
            contexts: Arc::new(AuthStateStore::new()),
            _attachment: None,
            events,
        }
    }

    /// Client over a private copy of `state`, sharing the connection pool
    #[must_use]
    pub fn for_browser(&self, state: StoredAuthState) -> Self {
        self.derive(Arc::new(Mutex::new(state)), None)
    }

    /// Client over the live state of browser `context`.
    ///
    /// `persisted` (the state read from the request's cookie) seeds the live
    /// state only when no other request of the context is in flight.
    #[must_use]
    pub fn for_context(&self, context: &str, persisted: StoredAuthState) -> Self {
        let attachment = self.contexts.attach(context, persisted);
        self.derive(attachment.state(), Some(attachment))
    }

    fn derive(&self, state: SharedState, attachment: Option<Attachment>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            state,
            contexts: Arc::clone(&self.contexts),
            _attachment: attachment,
            events,
        }
    }

    /// Grant the active session permission to set a new password
    pub fn mark_recovery_session(&self) {
        let mut state = self.lock_state();
        state.recovery = state.session.is_some();
    }

    /// Whether the active session was established by a recovery link
    #[must_use]
    pub fn is_recovery_session(&self) -> bool {
        let state = self.lock_state();
        state.recovery && state.session.is_some()
    }

    /// Copy of the state to persist back into the browser
    #[must_use]
    pub fn snapshot(&self) -> StoredAuthState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, StoredAuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn active_access_token(&self) -> Result<String, ProviderError> {
        self.lock_state()
            .session
            .as_ref()
            .map(|session| session.access_token.clone())
            .ok_or(ProviderError::NoSession)
    }

    fn store_session(&self, session: &ResolvedSession, event: SessionEvent) {
        {
            let mut state = self.lock_state();
            state.session = Some(session.clone());
            state.recovery = false;
        }
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ProviderError> {
        let text = self.send(operation, request).await?;
        serde_json::from_str(&text).map_err(|e| {
            ProviderError::Unexpected(format!("Failed to parse {operation} response: {e}"))
        })
    }

    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<String, ProviderError> {
        debug!("Identity provider request: {operation}");
        let response = request
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| classify_transport(&e))?;
        if status.is_success() {
            Ok(text)
        } else {
            let error = classify_status(status, &text);
            LoggingHelper::log_provider_error(operation, &error);
            Err(error)
        }
    }

    async fn fetch_user(&self, access_token: &str) -> Result<UserResponse, ProviderError> {
        let request = self
            .http_client
            .get(self.endpoint("user"))
            .bearer_auth(access_token);
        self.send_json("get_user", request).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<ResolvedSession, ProviderError> {
        let request = self
            .http_client
            .post(self.endpoint("token"))
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }));
        let response: SessionResponse = self.send_json("refresh_token", request).await?;
        Ok(into_session(response))
    }
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn get_session(&self) -> Option<ResolvedSession> {
        let state = self.lock_state();
        state
            .session
            .as_ref()
            .filter(|session| !session.is_expired_at(Utc::now()))
            .cloned()
    }

    async fn exchange_authorization_code(
        &self,
        code: &str,
    ) -> Result<ResolvedSession, ProviderError> {
        // The verifier is single-use whether or not the exchange succeeds
        let verifier = self.lock_state().code_verifier.take().ok_or_else(|| {
            ProviderError::Rejected("no code verifier stored for this browser".to_string())
        })?;
        let request = self
            .http_client
            .post(self.endpoint("token"))
            .query(&[("grant_type", "pkce")])
            .json(&json!({ "auth_code": code, "code_verifier": verifier }));
        let response: SessionResponse = self.send_json("exchange_code", request).await?;
        let session = into_session(response);
        self.store_session(&session, SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn verify_one_time_token(
        &self,
        token_hash: &str,
        otp_type: OtpType,
    ) -> Result<ResolvedSession, ProviderError> {
        let request = self
            .http_client
            .post(self.endpoint("verify"))
            .json(&json!({ "type": otp_type.as_str(), "token_hash": token_hash }));
        let response: SessionResponse = self.send_json("verify_otp", request).await?;
        let session = into_session(response);
        let event = if otp_type == OtpType::Recovery {
            SessionEvent::PasswordRecovery(session.clone())
        } else {
            SessionEvent::SignedIn(session.clone())
        };
        self.store_session(&session, event);
        Ok(session)
    }

    async fn install_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<ResolvedSession, ProviderError> {
        let expires_at = access_token_expiry(access_token);
        let still_valid = !expires_at.is_some_and(|at| at <= Utc::now());

        let session = if still_valid {
            match self.fetch_user(access_token).await {
                Ok(user) => ResolvedSession {
                    user_id: user.id,
                    email: user.email,
                    access_token: access_token.to_string(),
                    refresh_token: Some(refresh_token.to_string()),
                    expires_at,
                },
                Err(ProviderError::Rejected(reason)) => {
                    debug!("Access token refused ({reason}), trying refresh token");
                    self.refresh(refresh_token).await?
                }
                Err(e) => return Err(e),
            }
        } else {
            debug!("Access token already expired, trying refresh token");
            self.refresh(refresh_token).await?
        };

        self.store_session(&session, SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn update_password(&self, new_password: &str) -> Result<(), ProviderError> {
        let access_token = self.active_access_token()?;
        let request = self
            .http_client
            .put(self.endpoint("user"))
            .bearer_auth(access_token)
            .json(&json!({ "password": new_password }));
        let _user: UserResponse = self.send_json("update_user", request).await?;

        let session = {
            let mut state = self.lock_state();
            state.recovery = false;
            state.session.clone()
        };
        if let Some(session) = session {
            let _ = self.events.send(SessionEvent::UserUpdated(session));
        }
        info!("Password updated for current session");
        Ok(())
    }

    async fn request_password_recovery(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), ProviderError> {
        let pkce = PkcePair::generate();
        let request = self
            .http_client
            .post(self.endpoint("recover"))
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({
                "email": email,
                "code_challenge": pkce.challenge,
                "code_challenge_method": PkcePair::method(),
            }));
        self.send("recover", request).await?;
        self.lock_state().code_verifier = Some(pkce.verifier);
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let session = {
            let mut state = self.lock_state();
            state.recovery = false;
            state.session.take()
        };
        let _ = self.events.send(SessionEvent::SignedOut);
        let Some(session) = session else {
            return Ok(());
        };
        let request = self
            .http_client
            .post(self.endpoint("logout"))
            .bearer_auth(&session.access_token);
        match self.send("logout", request).await {
            Ok(_) | Err(ProviderError::Rejected(_)) => Ok(()),
            Err(e) => {
                warn!("Remote sign-out failed, local session dropped anyway: {e}");
                Err(e)
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

fn into_session(response: SessionResponse) -> ResolvedSession {
    let expires_at = response
        .expires_at
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .or_else(|| {
            response
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs))
        })
        .or_else(|| access_token_expiry(&response.access_token));
    ResolvedSession {
        user_id: response.user.id,
        email: response.user.email,
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        expires_at,
    }
}

/// `exp` claim of a JWT access token, if it has one
fn access_token_expiry(access_token: &str) -> Option<DateTime<Utc>> {
    let claims = unverified_jwt_claims(access_token)?;
    let exp = claims.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}

/// Map a non-success HTTP status plus body into the error taxonomy
fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let detail = describe_error_body(body);
    match status.as_u16() {
        400 | 401 | 403 | 404 | 409 | 410 | 422 => ProviderError::Rejected(detail),
        408 | 429 | 500..=599 => ProviderError::Unavailable(format!("{status}: {detail}")),
        _ => ProviderError::Unexpected(format!("{status}: {detail}")),
    }
}

fn classify_transport(err: &reqwest::Error) -> ProviderError {
    if err.is_decode() || err.is_body() {
        ProviderError::Unexpected(err.to_string())
    } else {
        ProviderError::Transport(err.to_string())
    }
}

/// Pick the most specific message out of the provider's error body shapes
fn describe_error_body(body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .error_code
        .or(parsed.error_description)
        .or(parsed.msg)
        .or(parsed.message)
        .or(parsed.error)
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no error details".to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        })
}
