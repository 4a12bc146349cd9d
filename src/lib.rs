#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the authgate application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod callback;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod models;
pub mod provider;
pub mod scheduler;
pub mod settings;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use callback::{CallbackFlow, CallbackUrl, FlowOutcome, MemoryRecoveryFlag, RecoveryFlag};
pub use error::{AuthFlowError, ProviderError};
pub use guard::{GuardDecision, GuardRequirements, RouteGuard};
pub use models::{FlowIntent, ResolvedSession, Route};
pub use provider::{GoTrueClient, IdentityProvider};
pub use scheduler::{FlowRegistry, Pacer, RetryState};
pub use settings::AuthgateSettings;
