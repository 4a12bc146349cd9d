// Callback flow: extractor -> classifier -> resolver -> gate -> exit

use crate::callback::classifier::classify;
use crate::callback::exit::{self, FlowOutcome};
use crate::callback::extractor::CallbackUrl;
use crate::callback::flag::RecoveryFlag;
use crate::callback::recovery_gate::RecoveryGate;
use crate::callback::resolver::{Resolution, SessionResolver};
use crate::error::AuthFlowError;
use crate::models::IncomingCredential;
use crate::provider::IdentityProvider;
use crate::scheduler::Pacer;
use crate::settings::RetrySettings;
use crate::utils::logging::LoggingHelper;

/// One callback flow instance
pub struct CallbackFlow<'a> {
    provider: &'a dyn IdentityProvider,
    flag: &'a dyn RecoveryFlag,
    recovery_gate: RetrySettings,
}

impl<'a> CallbackFlow<'a> {
    #[must_use]
    pub fn new(provider: &'a dyn IdentityProvider, flag: &'a dyn RecoveryFlag) -> Self {
        Self {
            provider,
            flag,
            recovery_gate: RetrySettings::recovery_gate_defaults(),
        }
    }

    #[must_use]
    pub const fn with_recovery_gate(mut self, retry: RetrySettings) -> Self {
        self.recovery_gate = retry;
        self
    }

    /// Resolve the callback to a terminal outcome
    ///
    /// # Errors
    ///
    /// Returns `AuthFlowError::Cancelled` if the flow is torn down before it
    /// finishes. A cancelled flow leaves the recovery flag untouched; every
    /// other result, including failures, is a [`FlowOutcome`].
    pub async fn run(
        &self,
        callback: &CallbackUrl,
        pacer: &Pacer,
    ) -> Result<FlowOutcome, AuthFlowError> {
        let extracted = callback.extract();
        let classification = classify(&extracted, self.flag.is_requested());
        let labels: Vec<&str> = extracted
            .credentials
            .iter()
            .map(IncomingCredential::label)
            .collect();
        LoggingHelper::log_intent(classification.intent, classification.source, &labels);

        let mut resolver = SessionResolver::new(self.provider, pacer);
        let result = match resolver.resolve(&extracted, classification.intent).await? {
            Resolution::Resolved { session, .. } => Ok(session),
            Resolution::Failed(error) => Err(error),
            Resolution::WaitingForPropagation => {
                match RecoveryGate::new(self.provider, self.recovery_gate)
                    .await_session(pacer)
                    .await
                {
                    Err(AuthFlowError::Cancelled) => return Err(AuthFlowError::Cancelled),
                    other => other,
                }
            }
        };

        pacer.ensure_current()?;
        Ok(exit::finish(classification.intent, result, self.flag))
    }
}
