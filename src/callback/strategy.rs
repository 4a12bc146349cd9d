//! Credential resolution strategies
//!
//! Each [`Strategy`] looks at the extracted callback and either plans an
//! [`Attempt`] (a single identity-provider call) or declines. Planning is
//! pure; only [`Attempt::execute`] touches the provider.

use crate::callback::extractor::{extract_referrer_token, ExtractedCallback};
use crate::error::ProviderError;
use crate::models::{FlowIntent, IncomingCredential, OpaqueTokenKind, OtpType, ResolvedSession};
use crate::provider::IdentityProvider;
use std::fmt;

/// Resolution strategies, in the order the resolver tries them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    ExchangeCode,
    VerifyOpaqueToken,
    SetHashSession,
    VerifyTokenHash,
    VerifyReferrerToken,
}

impl Strategy {
    pub const ORDER: [Self; 5] = [
        Self::ExchangeCode,
        Self::VerifyOpaqueToken,
        Self::SetHashSession,
        Self::VerifyTokenHash,
        Self::VerifyReferrerToken,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExchangeCode => "exchange_code",
            Self::VerifyOpaqueToken => "verify_opaque_token",
            Self::SetHashSession => "set_hash_session",
            Self::VerifyTokenHash => "verify_token_hash",
            Self::VerifyReferrerToken => "verify_referrer_token",
        }
    }

    /// Plan this strategy's provider call, or decline with `None`
    #[must_use]
    pub fn plan(self, extracted: &ExtractedCallback, intent: FlowIntent) -> Option<Attempt> {
        let mut credentials = extracted.credentials.iter();
        match self {
            Self::ExchangeCode => credentials.find_map(|credential| match credential {
                IncomingCredential::AuthorizationCode { code } => {
                    Some(Attempt::ExchangeCode { code: code.clone() })
                }
                _ => None,
            }),
            Self::VerifyOpaqueToken => credentials.find_map(|credential| match credential {
                IncomingCredential::OpaqueToken {
                    token,
                    kind: OpaqueTokenKind::PkcePrefixed,
                    type_hint,
                } => Some(Attempt::VerifyOtp {
                    token_hash: token.clone(),
                    otp_type: otp_type_for(type_hint.as_deref(), intent),
                }),
                _ => None,
            }),
            Self::SetHashSession => credentials.find_map(|credential| match credential {
                IncomingCredential::HashTokenPair {
                    access_token,
                    refresh_token,
                } => Some(Attempt::InstallSession {
                    access_token: access_token.clone(),
                    refresh_token: refresh_token.clone(),
                }),
                _ => None,
            }),
            Self::VerifyTokenHash => credentials.find_map(|credential| match credential {
                IncomingCredential::TokenHash { hash, type_hint } => Some(Attempt::VerifyOtp {
                    token_hash: hash.clone(),
                    otp_type: otp_type_for(type_hint.as_deref(), intent),
                }),
                _ => None,
            }),
            Self::VerifyReferrerToken => {
                if intent != FlowIntent::PasswordRecovery {
                    return None;
                }
                let token = extracted.referrer.as_deref().and_then(extract_referrer_token)?;
                Some(Attempt::VerifyOtp {
                    token_hash: token,
                    otp_type: OtpType::Recovery,
                })
            }
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned identity-provider call
#[derive(Clone, PartialEq, Eq)]
pub enum Attempt {
    ExchangeCode { code: String },
    VerifyOtp { token_hash: String, otp_type: OtpType },
    InstallSession {
        access_token: String,
        refresh_token: String,
    },
}

impl Attempt {
    /// Run the call against the provider
    ///
    /// # Errors
    ///
    /// Returns the provider's classified error unchanged.
    pub async fn execute(
        &self,
        provider: &dyn IdentityProvider,
    ) -> Result<ResolvedSession, ProviderError> {
        match self {
            Self::ExchangeCode { code } => provider.exchange_authorization_code(code).await,
            Self::VerifyOtp {
                token_hash,
                otp_type,
            } => provider.verify_one_time_token(token_hash, *otp_type).await,
            Self::InstallSession {
                access_token,
                refresh_token,
            } => provider.install_session(access_token, refresh_token).await,
        }
    }
}

impl fmt::Debug for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExchangeCode { .. } => f.write_str("ExchangeCode { .. }"),
            Self::VerifyOtp { otp_type, .. } => f
                .debug_struct("VerifyOtp")
                .field("otp_type", otp_type)
                .finish_non_exhaustive(),
            Self::InstallSession { .. } => f.write_str("InstallSession { .. }"),
        }
    }
}

/// Verification type: a recognised hint, else `recovery` for recovery flows, else `email`
#[must_use]
pub fn otp_type_for(type_hint: Option<&str>, intent: FlowIntent) -> OtpType {
    type_hint
        .and_then(OtpType::from_hint)
        .unwrap_or(match intent {
            FlowIntent::PasswordRecovery => OtpType::Recovery,
            FlowIntent::SignIn => OtpType::Email,
        })
}
