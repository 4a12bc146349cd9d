//! Session resolver state machine
//!
//! ```text
//! Idle -> CheckingExistingSession -> Attempting(strategy)* -> Resolved
//!                                                           -> WaitingForPropagation
//!                                                           -> Failed
//! ```
//!
//! Strategies run strictly one after another. A rejected strategy is logged
//! and the next one is tried; the first session wins.

use crate::callback::extractor::ExtractedCallback;
use crate::callback::strategy::Strategy;
use crate::error::{AuthFlowError, ProviderError};
use crate::models::{FlowIntent, IncomingCredential, ResolvedSession};
use crate::provider::IdentityProvider;
use crate::scheduler::Pacer;
use crate::utils::logging::LoggingHelper;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Idle,
    CheckingExistingSession,
    Attempting(Strategy),
    WaitingForPropagation,
    Resolved,
    Failed,
}

impl fmt::Display for ResolverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::CheckingExistingSession => f.write_str("checking_existing_session"),
            Self::Attempting(strategy) => write!(f, "attempting({strategy})"),
            Self::WaitingForPropagation => f.write_str("waiting_for_propagation"),
            Self::Resolved => f.write_str("resolved"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Result of one resolver run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// `strategy` is `None` when an already-installed session was reused
    Resolved {
        session: ResolvedSession,
        strategy: Option<Strategy>,
    },
    /// Recovery intent with nothing usable on the URL; the session may still appear
    WaitingForPropagation,
    Failed(AuthFlowError),
}

pub struct SessionResolver<'a> {
    provider: &'a dyn IdentityProvider,
    pacer: &'a Pacer,
    state: ResolverState,
    history: Vec<ResolverState>,
}

impl<'a> SessionResolver<'a> {
    #[must_use]
    pub fn new(provider: &'a dyn IdentityProvider, pacer: &'a Pacer) -> Self {
        Self {
            provider,
            pacer,
            state: ResolverState::Idle,
            history: vec![ResolverState::Idle],
        }
    }

    #[must_use]
    pub const fn state(&self) -> ResolverState {
        self.state
    }

    /// Every state visited so far, starting with `Idle`
    #[must_use]
    pub fn history(&self) -> &[ResolverState] {
        &self.history
    }

    /// Drive the machine to a terminal state
    ///
    /// # Errors
    ///
    /// Returns `AuthFlowError::Cancelled` if the owning flow is torn down
    /// between steps. Every other outcome is a [`Resolution`].
    pub async fn resolve(
        &mut self,
        extracted: &ExtractedCallback,
        intent: FlowIntent,
    ) -> Result<Resolution, AuthFlowError> {
        self.pacer.ensure_current()?;
        self.transition(ResolverState::CheckingExistingSession);
        let existing = self.provider.get_session().await;
        self.pacer.ensure_current()?;
        if let Some(session) = existing {
            LoggingHelper::log_session_resolved(None, session.display_identity());
            self.transition(ResolverState::Resolved);
            return Ok(Resolution::Resolved {
                session,
                strategy: None,
            });
        }

        if let Some(IncomingCredential::ProviderError { code, description }) =
            extracted.provider_error()
        {
            self.transition(ResolverState::Failed);
            return Ok(Resolution::Failed(AuthFlowError::ProviderReported {
                code: code.clone(),
                description: description.clone(),
            }));
        }

        let mut last_rejection: Option<(Strategy, ProviderError)> = None;
        for strategy in Strategy::ORDER {
            let Some(attempt) = strategy.plan(extracted, intent) else {
                continue;
            };
            self.transition(ResolverState::Attempting(strategy));
            let result = attempt.execute(self.provider).await;
            self.pacer.ensure_current()?;
            match result {
                Ok(session) => {
                    LoggingHelper::log_session_resolved(
                        Some(strategy.as_str()),
                        session.display_identity(),
                    );
                    self.transition(ResolverState::Resolved);
                    return Ok(Resolution::Resolved {
                        session,
                        strategy: Some(strategy),
                    });
                }
                Err(error) => {
                    LoggingHelper::log_strategy_rejected(strategy.as_str(), &error);
                    last_rejection = Some((strategy, error));
                }
            }
        }

        if intent == FlowIntent::PasswordRecovery {
            self.transition(ResolverState::WaitingForPropagation);
            return Ok(Resolution::WaitingForPropagation);
        }

        self.transition(ResolverState::Failed);
        let error = match last_rejection {
            Some((strategy, source)) => AuthFlowError::ExchangeRejected {
                strategy: strategy.as_str(),
                source,
            },
            None => AuthFlowError::NoCredentialFound,
        };
        Ok(Resolution::Failed(error))
    }

    fn transition(&mut self, next: ResolverState) {
        LoggingHelper::log_transition(&self.state, &next);
        self.state = next;
        self.history.push(next);
    }
}
