//! Identity provider boundary
//!
//! The callback flow and the route guard talk to the identity provider only
//! through [`IdentityProvider`]. The provider owns session persistence: the
//! flow triggers session creation and observes the result, nothing more.
//!
//! - [`gotrue`] - REST client for GoTrue-compatible auth servers
//! - [`pkce`] - PKCE verifier/challenge generation
//! - [`store`] - live auth state shared across a browser's requests

pub mod gotrue;
pub mod pkce;
pub mod store;

use crate::error::ProviderError;
use crate::models::{OtpType, ResolvedSession, SessionEvent};
use async_trait::async_trait;
use tokio::sync::broadcast;

pub use gotrue::{GoTrueClient, StoredAuthState};
pub use pkce::PkcePair;
pub use store::AuthStateStore;

/// Operations the flow core consumes from the identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Currently installed, unexpired session. Must not mutate any state.
    async fn get_session(&self) -> Option<ResolvedSession>;

    /// Exchange a single-use PKCE authorization code for a session
    ///
    /// # Errors
    ///
    /// Returns a classified [`ProviderError`] if the exchange fails.
    async fn exchange_authorization_code(&self, code: &str)
        -> Result<ResolvedSession, ProviderError>;

    /// Verify a single-use token (or token hash) of the given type
    ///
    /// # Errors
    ///
    /// Returns a classified [`ProviderError`] if verification fails.
    async fn verify_one_time_token(
        &self,
        token_hash: &str,
        otp_type: OtpType,
    ) -> Result<ResolvedSession, ProviderError>;

    /// Install already-issued tokens as the active session
    ///
    /// # Errors
    ///
    /// Returns a classified [`ProviderError`] if the tokens are not accepted.
    async fn install_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<ResolvedSession, ProviderError>;

    /// Set a new password for the active session's user
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::NoSession` without an active session, or a
    /// classified error if the provider refuses the update.
    async fn update_password(&self, new_password: &str) -> Result<(), ProviderError>;

    /// Ask the provider to email a password-recovery link
    ///
    /// # Errors
    ///
    /// Returns a classified [`ProviderError`] if the request fails.
    async fn request_password_recovery(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), ProviderError>;

    /// End the active session
    ///
    /// # Errors
    ///
    /// Returns a classified [`ProviderError`] if revocation fails; the local
    /// session is dropped regardless.
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Subscribe to session lifecycle notifications
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}
