//! Scripted in-memory stand-ins for the identity provider and entitlement store
//!
//! Every call is recorded so tests can assert on what was (and was not)
//! asked of the provider, and in which order.

use crate::error::ProviderError;
use crate::guard::{EntitlementError, EntitlementSource, ProgressReporter};
use crate::models::{EntitlementRecord, OtpType, ResolvedSession, SessionEvent};
use crate::provider::IdentityProvider;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

/// One recorded call against [`MockIdentityProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    GetSession,
    ExchangeCode(String),
    VerifyOtp { token_hash: String, otp_type: OtpType },
    InstallSession { access_token: String },
    UpdatePassword,
    RequestRecovery { email: String },
    SignOut,
}

#[derive(Default)]
struct MockState {
    session: Option<ResolvedSession>,
    /// Session that becomes visible after this many `get_session` calls return nothing
    pending: Option<(u32, ResolvedSession)>,
    empty_polls: u32,
    codes: HashMap<String, Result<ResolvedSession, ProviderError>>,
    otps: HashMap<String, Result<ResolvedSession, ProviderError>>,
    installs: HashMap<String, Result<ResolvedSession, ProviderError>>,
    password_error: Option<ProviderError>,
    calls: Vec<ProviderCall>,
}

/// Identity provider whose answers are scripted up front.
///
/// Unscripted credentials are rejected, the way a real provider refuses
/// unknown codes. A successful exchange installs the session.
pub struct MockIdentityProvider {
    state: Mutex<MockState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(MockState::default()),
            events,
        }
    }

    /// Start with a session already installed
    #[must_use]
    pub fn with_session(self, session: ResolvedSession) -> Self {
        self.lock().session = Some(session);
        self
    }

    /// Make a session appear only after `empty_polls` session checks came back empty
    #[must_use]
    pub fn with_session_after(self, empty_polls: u32, session: ResolvedSession) -> Self {
        self.lock().pending = Some((empty_polls, session));
        self
    }

    #[must_use]
    pub fn accept_code(self, code: &str, session: ResolvedSession) -> Self {
        self.lock().codes.insert(code.to_string(), Ok(session));
        self
    }

    #[must_use]
    pub fn reject_code(self, code: &str, error: ProviderError) -> Self {
        self.lock().codes.insert(code.to_string(), Err(error));
        self
    }

    #[must_use]
    pub fn accept_otp(self, token_hash: &str, session: ResolvedSession) -> Self {
        self.lock().otps.insert(token_hash.to_string(), Ok(session));
        self
    }

    #[must_use]
    pub fn reject_otp(self, token_hash: &str, error: ProviderError) -> Self {
        self.lock().otps.insert(token_hash.to_string(), Err(error));
        self
    }

    #[must_use]
    pub fn accept_tokens(self, access_token: &str, session: ResolvedSession) -> Self {
        self.lock()
            .installs
            .insert(access_token.to_string(), Ok(session));
        self
    }

    #[must_use]
    pub fn fail_password_update(self, error: ProviderError) -> Self {
        self.lock().password_error = Some(error);
        self
    }

    /// Every call made so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    /// Calls other than `get_session`
    #[must_use]
    pub fn credential_calls(&self) -> Vec<ProviderCall> {
        self.calls()
            .into_iter()
            .filter(|call| *call != ProviderCall::GetSession)
            .collect()
    }

    #[must_use]
    pub fn session_checks(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == ProviderCall::GetSession)
            .count()
    }

    #[must_use]
    pub fn current_session(&self) -> Option<ResolvedSession> {
        self.lock().session.clone()
    }

    /// Publish a session event to subscribers
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: ProviderCall) {
        self.lock().calls.push(call);
    }

    fn install(
        &self,
        result: Option<Result<ResolvedSession, ProviderError>>,
        event: fn(ResolvedSession) -> SessionEvent,
    ) -> Result<ResolvedSession, ProviderError> {
        let result = result
            .unwrap_or_else(|| Err(ProviderError::Rejected("unknown credential".to_string())));
        if let Ok(session) = &result {
            self.lock().session = Some(session.clone());
            self.emit(event(session.clone()));
        }
        result
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn get_session(&self) -> Option<ResolvedSession> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::GetSession);
        if state.session.is_none() {
            if let Some((after, session)) = state.pending.clone() {
                if state.empty_polls >= after {
                    state.session = Some(session);
                    state.pending = None;
                } else {
                    state.empty_polls += 1;
                }
            }
        }
        state.session.clone()
    }

    async fn exchange_authorization_code(
        &self,
        code: &str,
    ) -> Result<ResolvedSession, ProviderError> {
        self.record(ProviderCall::ExchangeCode(code.to_string()));
        let scripted = self.lock().codes.remove(code);
        self.install(scripted, SessionEvent::SignedIn)
    }

    async fn verify_one_time_token(
        &self,
        token_hash: &str,
        otp_type: OtpType,
    ) -> Result<ResolvedSession, ProviderError> {
        self.record(ProviderCall::VerifyOtp {
            token_hash: token_hash.to_string(),
            otp_type,
        });
        let scripted = self.lock().otps.remove(token_hash);
        if otp_type == OtpType::Recovery {
            self.install(scripted, SessionEvent::PasswordRecovery)
        } else {
            self.install(scripted, SessionEvent::SignedIn)
        }
    }

    async fn install_session(
        &self,
        access_token: &str,
        _refresh_token: &str,
    ) -> Result<ResolvedSession, ProviderError> {
        self.record(ProviderCall::InstallSession {
            access_token: access_token.to_string(),
        });
        let scripted = self.lock().installs.get(access_token).cloned();
        self.install(scripted, SessionEvent::SignedIn)
    }

    async fn update_password(&self, _new_password: &str) -> Result<(), ProviderError> {
        self.record(ProviderCall::UpdatePassword);
        let (session, error) = {
            let state = self.lock();
            (state.session.clone(), state.password_error.clone())
        };
        let Some(session) = session else {
            return Err(ProviderError::NoSession);
        };
        if let Some(error) = error {
            return Err(error);
        }
        self.emit(SessionEvent::UserUpdated(session));
        Ok(())
    }

    async fn request_password_recovery(
        &self,
        email: &str,
        _redirect_to: &str,
    ) -> Result<(), ProviderError> {
        self.record(ProviderCall::RequestRecovery {
            email: email.to_string(),
        });
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.record(ProviderCall::SignOut);
        self.lock().session = None;
        self.emit(SessionEvent::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

/// Entitlement store answering from a script, then from a fallback
pub struct MockEntitlementSource {
    script: Mutex<VecDeque<Result<Option<EntitlementRecord>, EntitlementError>>>,
    fallback: Result<Option<EntitlementRecord>, EntitlementError>,
    calls: Mutex<u32>,
}

impl MockEntitlementSource {
    /// Always answer with `record` (or no record)
    #[must_use]
    pub fn returning(record: Option<EntitlementRecord>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Ok(record),
            calls: Mutex::new(0),
        }
    }

    /// Always fail with `error`
    #[must_use]
    pub fn failing(error: EntitlementError) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Err(error),
            calls: Mutex::new(0),
        }
    }

    /// Answer the next calls from `script` before falling back
    #[must_use]
    pub fn then(
        self,
        script: impl IntoIterator<Item = Result<Option<EntitlementRecord>, EntitlementError>>,
    ) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(script);
        self
    }

    #[must_use]
    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EntitlementSource for MockEntitlementSource {
    async fn fetch_entitlement(
        &self,
        _session: &ResolvedSession,
    ) -> Result<Option<EntitlementRecord>, EntitlementError> {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Progress reporter that remembers every retry notice
#[derive(Debug, Default)]
pub struct RecordingProgress {
    retries: Mutex<Vec<(u32, Duration)>>,
}

impl RecordingProgress {
    /// `(attempt, delay)` pairs in the order they were reported
    #[must_use]
    pub fn retries(&self) -> Vec<(u32, Duration)> {
        self.retries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn retrying(&self, attempt: u32, _max_attempts: u32, delay: Duration) {
        self.retries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((attempt, delay));
    }
}
