//! Recovery completion gate
//!
//! A recovery link may have been verified by the provider's own redirect
//! before the callback page ever ran, in which case the session shows up a
//! moment later rather than on the URL. The gate re-queries for it a
//! bounded number of times.

use crate::error::AuthFlowError;
use crate::models::ResolvedSession;
use crate::provider::IdentityProvider;
use crate::scheduler::Pacer;
use crate::settings::RetrySettings;
use crate::utils::logging::LoggingHelper;

pub struct RecoveryGate<'a> {
    provider: &'a dyn IdentityProvider,
    retry: RetrySettings,
}

impl<'a> RecoveryGate<'a> {
    #[must_use]
    pub const fn new(provider: &'a dyn IdentityProvider, retry: RetrySettings) -> Self {
        Self { provider, retry }
    }

    /// Wait for a session to propagate, re-querying after each delay
    ///
    /// # Errors
    ///
    /// Returns `PropagationTimeout` once the retry budget is spent, or
    /// `Cancelled` if the flow is torn down while waiting.
    pub async fn await_session(&self, pacer: &Pacer) -> Result<ResolvedSession, AuthFlowError> {
        let mut retry = self.retry.retry_state();
        while let Some(delay) = retry.next_delay() {
            LoggingHelper::log_gate_attempt(retry.attempt(), retry.max_attempts(), delay);
            pacer.pause(delay).await?;
            let session = self.provider.get_session().await;
            pacer.ensure_current()?;
            if let Some(session) = session {
                log::info!(
                    "Recovery session visible after {} check(s) for {}",
                    retry.attempt(),
                    session.display_identity()
                );
                return Ok(session);
            }
        }
        Err(AuthFlowError::PropagationTimeout {
            attempts: retry.attempt(),
        })
    }

    /// Return the current session, waiting for propagation if none is installed yet
    ///
    /// # Errors
    ///
    /// Same as [`RecoveryGate::await_session`].
    pub async fn ensure_session(&self, pacer: &Pacer) -> Result<ResolvedSession, AuthFlowError> {
        pacer.ensure_current()?;
        if let Some(session) = self.provider.get_session().await {
            return Ok(session);
        }
        self.await_session(pacer).await
    }
}
