//! Authentication callback flow
//!
//! - [`extractor`] - credentials from the callback URL
//! - [`classifier`] - sign-in or password recovery
//! - [`resolver`] / [`strategy`] - credential to session
//! - [`recovery_gate`] - bounded wait for a propagating recovery session
//! - [`exit`] - final route, flag cleanup
//! - [`flow`] - composes the above

pub mod classifier;
pub mod exit;
pub mod extractor;
pub mod flag;
pub mod flow;
pub mod recovery_gate;
pub mod resolver;
pub mod strategy;

pub use classifier::{classify, Classification};
pub use exit::{redirect_target, FlowOutcome};
pub use extractor::{extract_referrer_token, CallbackUrl, ExtractedCallback};
pub use flag::{MemoryRecoveryFlag, RecoveryFlag};
pub use flow::CallbackFlow;
pub use recovery_gate::RecoveryGate;
pub use resolver::{Resolution, ResolverState, SessionResolver};
pub use strategy::{Attempt, Strategy};
