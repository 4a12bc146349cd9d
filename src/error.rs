//! Error taxonomy for the callback flow and the route guard
//!
//! Provider-specific error shapes are translated into [`ProviderError`] once,
//! at the identity-provider client edge. Everything above that boundary
//! matches on variants and never inspects message strings.

use thiserror::Error;

/// Classified failure of a single identity-provider call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The credential was refused: expired, invalid, already used or mismatched type
    #[error("credential rejected: {0}")]
    Rejected(String),
    /// The provider answered but is temporarily unable to serve (429, 5xx)
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
    /// The request never produced a response (connect, timeout, TLS)
    #[error("transport failure: {0}")]
    Transport(String),
    /// The operation requires an active session and none is installed
    #[error("no active session")]
    NoSession,
    /// Anything the classifier could not place, including malformed bodies
    #[error("unexpected provider response: {0}")]
    Unexpected(String),
}

impl ProviderError {
    /// Whether retrying the same call later can reasonably succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Transport(_))
    }
}

/// Terminal outcomes of the callback flow and route guard
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFlowError {
    /// The identity provider embedded an error in the redirect
    #[error("{}", reported_message(.code, .description))]
    ProviderReported {
        code: String,
        description: Option<String>,
    },
    /// The last attempted strategy was rejected by the provider
    #[error("This link is invalid or has expired")]
    ExchangeRejected {
        strategy: &'static str,
        source: ProviderError,
    },
    /// Recovery intent, but no session became visible within the bounded retries
    #[error("Your password reset link could not be verified. Please request a new one.")]
    PropagationTimeout { attempts: u32 },
    /// Nothing on the URL looked like a credential
    #[error("No valid authentication parameters found")]
    NoCredentialFound,
    /// Authorization lookups kept failing at the network level
    #[error("We could not reach the server. Please check your connection and reload.")]
    TransientConnectivity { attempts: u32, last_error: String },
    /// The authorization lookup answered with something retrying cannot fix
    #[error("We could not confirm your access to this page. Please try again later.")]
    AuthorizationUnavailable { reason: String },
    /// The owning flow instance was torn down before it finished
    #[error("flow cancelled")]
    Cancelled,
}

impl AuthFlowError {
    /// Short machine-readable code carried into the sign-in redirect
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::ProviderReported { code, .. } => code,
            Self::ExchangeRejected { .. } => "link_invalid",
            Self::PropagationTimeout { .. } => "recovery_timeout",
            Self::NoCredentialFound => "no_credentials",
            Self::TransientConnectivity { .. } => "connectivity",
            Self::AuthorizationUnavailable { .. } => "authorization_unavailable",
            Self::Cancelled => "cancelled",
        }
    }

    /// Human-readable message shown to the user before the delayed redirect
    #[must_use]
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

fn reported_message<'a>(code: &'a str, description: &'a Option<String>) -> &'a str {
    description.as_deref().unwrap_or(code)
}
