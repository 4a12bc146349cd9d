// Centralized logging for the callback flow and the route guard
use crate::callback::resolver::ResolverState;
use crate::error::{AuthFlowError, ProviderError};
use crate::models::{FlowIntent, IntentSource, Route};
use log::{debug, info, warn};
use std::time::Duration;

/// Characters of a secret kept visible by [`redact`]
const VISIBLE_PREFIX: usize = 6;

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log a classified identity-provider failure
    pub fn log_provider_error(operation: &str, error: &ProviderError) {
        if error.is_transient() {
            warn!("⚠️ Identity provider {operation} failed (transient): {error}");
        } else {
            debug!("Identity provider {operation} failed: {error}");
        }
    }

    /// Log the classified intent of a callback flow
    pub fn log_intent(intent: FlowIntent, source: IntentSource, credential_labels: &[&str]) {
        info!(
            "🔍 Callback classified as {} (source: {source:?}, credentials: {credential_labels:?})",
            intent.as_str()
        );
        if source == IntentSource::TypeHint && intent == FlowIntent::PasswordRecovery {
            debug!("Recovery intent taken from an unauthenticated type hint");
        }
    }

    /// Log a resolver state transition
    pub fn log_transition(from: &ResolverState, to: &ResolverState) {
        debug!("Resolver: {from} -> {to}");
    }

    /// Log a strategy rejection that the resolver swallows before falling through
    pub fn log_strategy_rejected(strategy: &str, error: &ProviderError) {
        warn!("Strategy {strategy} did not produce a session, falling through: {error}");
    }

    /// Log a resolved session
    pub fn log_session_resolved(strategy: Option<&str>, identity: &str) {
        match strategy {
            Some(strategy) => info!("✅ Session established via {strategy} for {identity}"),
            None => info!("✅ Existing session reused for {identity}"),
        }
    }

    /// Log one propagation re-query of the recovery gate
    pub fn log_gate_attempt(attempt: u32, max_attempts: u32, delay: Duration) {
        debug!(
            "Recovery gate: waiting {}ms before session check {attempt}/{max_attempts}",
            delay.as_millis()
        );
    }

    /// Log one entitlement lookup retry of the route guard
    pub fn log_guard_retry(attempt: u32, max_attempts: u32, delay: Duration, error: &str) {
        warn!(
            "🔄 Entitlement lookup failed ({error}), retry {attempt}/{max_attempts} in {}ms",
            delay.as_millis()
        );
    }

    /// Log the terminal route of a callback flow
    pub fn log_flow_finished(intent: FlowIntent, route: &Route, error: Option<&AuthFlowError>) {
        match error {
            None => info!("🎯 {} flow finished, routing to {route:?}", intent.as_str()),
            Some(error) => warn!(
                "❌ {} flow failed ({}): {error}",
                intent.as_str(),
                error.code()
            ),
        }
    }

    /// Log that a flow instance was torn down mid-flight
    pub fn log_flow_cancelled(context: &str, slot: &str) {
        info!("⏭️  {slot} flow for context {} superseded or cancelled", redact(context));
    }
}

/// Shorten a secret for log output, keeping only a short prefix
#[must_use]
pub fn redact(secret: &str) -> String {
    if secret.chars().count() <= VISIBLE_PREFIX {
        return "***".to_string();
    }
    let prefix: String = secret.chars().take(VISIBLE_PREFIX).collect();
    format!("{prefix}***")
}
