//! Route guard for protected views
//!
//! Checks for a session, then for a sufficient entitlement tier. Transient
//! lookup failures are retried with capped exponential backoff; the guard
//! never waits unboundedly and never renders a view it could not authorize.

pub mod entitlements;

pub use entitlements::{EntitlementError, EntitlementSource, RestEntitlementSource};

use crate::error::AuthFlowError;
use crate::models::{ResolvedSession, SessionEvent, Tier};
use crate::provider::IdentityProvider;
use crate::scheduler::Pacer;
use crate::settings::{RetrySettings, RouteSettings};
use crate::utils::logging::LoggingHelper;
use crate::utils::redirect_validator::sanitize_return_to;
use std::time::Duration;
use tokio::sync::broadcast;

/// What a protected view needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardRequirements {
    /// Location to come back to after signing in
    pub return_to: String,
    /// Minimum tier; `None` means any signed-in user
    pub min_tier: Option<Tier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Render {
        session: ResolvedSession,
        tier: Option<Tier>,
    },
    RedirectToSignIn {
        location: String,
    },
    RedirectToUpgrade {
        location: String,
        required: Tier,
        current: Tier,
    },
    /// Authorization could not be determined; the user is asked to reload
    Unavailable {
        error: AuthFlowError,
    },
}

/// Receives a notice before every entitlement retry
pub trait ProgressReporter: Send + Sync {
    fn retrying(&self, attempt: u32, max_attempts: u32, delay: Duration);
}

/// Reporter for callers with nobody to show progress to
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn retrying(&self, _attempt: u32, _max_attempts: u32, _delay: Duration) {}
}

pub struct RouteGuard<'a> {
    provider: &'a dyn IdentityProvider,
    entitlements: &'a dyn EntitlementSource,
    routes: &'a RouteSettings,
    retry: RetrySettings,
}

impl<'a> RouteGuard<'a> {
    #[must_use]
    pub fn new(
        provider: &'a dyn IdentityProvider,
        entitlements: &'a dyn EntitlementSource,
        routes: &'a RouteSettings,
    ) -> Self {
        Self {
            provider,
            entitlements,
            routes,
            retry: RetrySettings::route_guard_defaults(),
        }
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// Decide whether the requested view may render
    ///
    /// # Errors
    ///
    /// Returns `AuthFlowError::Cancelled` if the flow is torn down while
    /// backing off. Every other outcome is a [`GuardDecision`].
    pub async fn check(
        &self,
        requirements: &GuardRequirements,
        pacer: &Pacer,
        progress: &dyn ProgressReporter,
    ) -> Result<GuardDecision, AuthFlowError> {
        pacer.ensure_current()?;
        let Some(session) = self.provider.get_session().await else {
            log::info!("No session for {}, redirecting to sign-in", requirements.return_to);
            return Ok(self.sign_in_redirect(&requirements.return_to));
        };
        pacer.ensure_current()?;

        let Some(required) = requirements.min_tier else {
            return Ok(GuardDecision::Render {
                session,
                tier: None,
            });
        };

        let current = match self.lookup_tier(&session, pacer, progress).await? {
            Ok(tier) => tier,
            Err(error) => return Ok(GuardDecision::Unavailable { error }),
        };

        if current < required {
            log::info!(
                "{} has tier {current}, {} requires {required}",
                session.display_identity(),
                requirements.return_to
            );
            return Ok(GuardDecision::RedirectToUpgrade {
                location: format!("{}?required={required}", self.routes.upgrade),
                required,
                current,
            });
        }

        Ok(GuardDecision::Render {
            session,
            tier: Some(current),
        })
    }

    /// Wait until the session ends externally, then produce a sign-in redirect
    ///
    /// # Errors
    ///
    /// Returns `AuthFlowError::Cancelled` if the owning flow is torn down first.
    pub async fn watch_session(
        &self,
        events: &mut broadcast::Receiver<SessionEvent>,
        return_to: &str,
        pacer: &Pacer,
    ) -> Result<GuardDecision, AuthFlowError> {
        loop {
            let event = tokio::select! {
                () = pacer.token().cancelled() => return Err(AuthFlowError::Cancelled),
                event = events.recv() => event,
            };
            match event {
                Ok(SessionEvent::SignedOut) | Err(broadcast::error::RecvError::Closed) => {
                    log::info!("Session ended while viewing {return_to}");
                    return Ok(self.sign_in_redirect(return_to));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("Session watcher skipped {skipped} event(s)");
                }
            }
        }
    }

    /// Outer `Result` carries cancellation, inner one the lookup outcome
    async fn lookup_tier(
        &self,
        session: &ResolvedSession,
        pacer: &Pacer,
        progress: &dyn ProgressReporter,
    ) -> Result<Result<Tier, AuthFlowError>, AuthFlowError> {
        let mut retry = self.retry.retry_state();
        loop {
            let result = self.entitlements.fetch_entitlement(session).await;
            pacer.ensure_current()?;
            let error = match result {
                Ok(record) => {
                    return Ok(Ok(record.map_or(Tier::Free, |record| record.effective_tier())));
                }
                Err(error) if error.is_transient() => error,
                Err(error) => {
                    log::error!("Entitlement lookup failed, not retrying: {error}");
                    return Ok(Err(AuthFlowError::AuthorizationUnavailable {
                        reason: error.to_string(),
                    }));
                }
            };

            let Some(delay) = retry.next_delay() else {
                return Ok(Err(AuthFlowError::TransientConnectivity {
                    attempts: retry.attempt() + 1,
                    last_error: error.to_string(),
                }));
            };
            LoggingHelper::log_guard_retry(
                retry.attempt(),
                retry.max_attempts(),
                delay,
                &error.to_string(),
            );
            progress.retrying(retry.attempt(), retry.max_attempts(), delay);
            pacer.pause(delay).await?;
        }
    }

    /// Redirect to sign-in that brings the user back to `return_to` if it is safe
    #[must_use]
    pub fn sign_in_redirect(&self, return_to: &str) -> GuardDecision {
        let return_to = sanitize_return_to(Some(return_to), &self.routes.app_root);
        GuardDecision::RedirectToSignIn {
            location: format!(
                "{}?return_to={}",
                self.routes.sign_in,
                urlencoding::encode(&return_to)
            ),
        }
    }
}
