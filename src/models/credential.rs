//! Credential shapes that can arrive on a callback URL

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix the identity provider puts on PKCE-flow verification tokens
pub const PKCE_TOKEN_PREFIX: &str = "pkce_";

/// Shape of a single-use `token` query value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpaqueTokenKind {
    PkcePrefixed,
    Plain,
}

impl OpaqueTokenKind {
    #[must_use]
    pub fn of(token: &str) -> Self {
        if token.starts_with(PKCE_TOKEN_PREFIX) {
            Self::PkcePrefixed
        } else {
            Self::Plain
        }
    }
}

/// One way a credential can be carried on an incoming URL.
///
/// Several variants may be present on the same URL at once (a fresh code next
/// to a stale token, for instance). Which one wins is decided by the resolver's
/// strategy order, not by the extractor.
#[derive(Clone, PartialEq, Eq)]
pub enum IncomingCredential {
    /// Already-issued session tokens carried in the fragment
    HashTokenPair {
        access_token: String,
        refresh_token: String,
    },
    /// PKCE authorization code from the query string
    AuthorizationCode { code: String },
    /// Single-use verification token
    OpaqueToken {
        token: String,
        kind: OpaqueTokenKind,
        type_hint: Option<String>,
    },
    /// Hashed single-use token
    TokenHash {
        hash: String,
        type_hint: Option<String>,
    },
    /// Error the provider embedded in the redirect instead of a credential
    ProviderError {
        code: String,
        description: Option<String>,
    },
}

impl IncomingCredential {
    /// Stable label for logs
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::HashTokenPair { .. } => "hash_token_pair",
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::OpaqueToken { .. } => "opaque_token",
            Self::TokenHash { .. } => "token_hash",
            Self::ProviderError { .. } => "provider_error",
        }
    }
}

// Token values must never reach the logs.
impl fmt::Debug for IncomingCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HashTokenPair { .. } => f.write_str("HashTokenPair { .. }"),
            Self::AuthorizationCode { .. } => f.write_str("AuthorizationCode { .. }"),
            Self::OpaqueToken {
                kind, type_hint, ..
            } => f
                .debug_struct("OpaqueToken")
                .field("kind", kind)
                .field("type_hint", type_hint)
                .finish_non_exhaustive(),
            Self::TokenHash { type_hint, .. } => f
                .debug_struct("TokenHash")
                .field("type_hint", type_hint)
                .finish_non_exhaustive(),
            Self::ProviderError { code, description } => f
                .debug_struct("ProviderError")
                .field("code", code)
                .field("description", description)
                .finish(),
        }
    }
}

/// Verification type passed to the provider's one-time-token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpType {
    Signup,
    Invite,
    Magiclink,
    Recovery,
    EmailChange,
    Email,
}

impl OtpType {
    /// Parse a `type` hint; unknown values are ignored rather than trusted
    #[must_use]
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint {
            "signup" => Some(Self::Signup),
            "invite" => Some(Self::Invite),
            "magiclink" => Some(Self::Magiclink),
            "recovery" => Some(Self::Recovery),
            "email_change" => Some(Self::EmailChange),
            "email" => Some(Self::Email),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Invite => "invite",
            Self::Magiclink => "magiclink",
            Self::Recovery => "recovery",
            Self::EmailChange => "email_change",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for OtpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
