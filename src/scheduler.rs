//! Bounded retry state and cancellable suspension points
//!
//! Every delay in the callback flow and the route guard goes through
//! [`Pacer::pause`], which races the sleep against the flow's
//! [`CancellationToken`] and re-checks the token on resumption. A flow that
//! was torn down while suspended therefore resumes into `Cancelled` and never
//! applies a stale transition.

use crate::error::AuthFlowError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Attempt counter with capped exponential delays.
///
/// `attempt` never exceeds `max_attempts`; once the budget is spent
/// [`RetryState::next_delay`] returns `None` and the caller must fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryState {
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Attempts consumed so far
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Consume one attempt and return the delay to wait before it.
    ///
    /// Delay for attempt `n` (1-based) is `base * 2^(n-1)`, capped at `max_delay`.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempt += 1;
        let factor = 2u32.saturating_pow(self.attempt - 1);
        let delay = self.base_delay.saturating_mul(factor);
        Some(delay.min(self.max_delay))
    }
}

/// Suspends a flow instance between attempts
#[derive(Debug, Clone, Default)]
pub struct Pacer {
    cancel: CancellationToken,
    generation: u64,
}

impl Pacer {
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            generation: 0,
        }
    }

    /// Token owned by this flow instance
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail fast if the owning flow has been torn down
    ///
    /// # Errors
    ///
    /// Returns `AuthFlowError::Cancelled` once the token is cancelled.
    pub fn ensure_current(&self) -> Result<(), AuthFlowError> {
        if self.cancel.is_cancelled() {
            Err(AuthFlowError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `delay` unless the flow is cancelled first
    ///
    /// # Errors
    ///
    /// Returns `AuthFlowError::Cancelled` if cancellation happens before or
    /// during the sleep.
    pub async fn pause(&self, delay: Duration) -> Result<(), AuthFlowError> {
        self.ensure_current()?;
        tokio::select! {
            () = self.cancel.cancelled() => return Err(AuthFlowError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
        self.ensure_current()
    }
}

/// Tracks live flow instances per browser context.
///
/// A flow is registered under its context plus a slot naming what it works
/// on. Starting a flow cancels whichever instance was previously registered
/// in the same slot; flows in other slots of the context keep running.
#[derive(Debug, Clone, Default)]
pub struct FlowRegistry {
    flows: Arc<Mutex<HashMap<FlowKey, (u64, CancellationToken)>>>,
    generations: Arc<AtomicU64>,
}

type FlowKey = (String, String);

impl FlowRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new flow for `context` in `slot`, cancelling the previous one there
    pub fn begin(&self, context: &str, slot: &str) -> Pacer {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        let key = (context.to_string(), slot.to_string());
        let previous = self.lock_flows().insert(key, (generation, token.clone()));
        if let Some((_, previous)) = previous {
            log::debug!("Cancelling superseded {slot} flow for context {context}");
            previous.cancel();
        }
        Pacer {
            cancel: token,
            generation,
        }
    }

    /// Remove the registration if it still belongs to `pacer`
    pub fn finish(&self, context: &str, slot: &str, pacer: &Pacer) {
        let key = (context.to_string(), slot.to_string());
        let mut flows = self.lock_flows();
        if flows
            .get(&key)
            .is_some_and(|(generation, _)| *generation == pacer.generation)
        {
            flows.remove(&key);
        }
    }

    /// Cancel every flow registered for `context`
    pub fn cancel(&self, context: &str) {
        self.lock_flows().retain(|(owner, _), (_, token)| {
            if owner == context {
                token.cancel();
                false
            } else {
                true
            }
        });
    }

    #[must_use]
    pub fn active_flows(&self) -> usize {
        self.lock_flows().len()
    }

    fn lock_flows(&self) -> MutexGuard<'_, HashMap<FlowKey, (u64, CancellationToken)>> {
        self.flows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
