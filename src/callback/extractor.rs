//! Token extraction from callback URLs
//!
//! Pure parsing: no network access, no side effects. Fragment fields are
//! read before query fields because fragment data never reaches a server log
//! and is the provider's preferred channel for issued tokens.

use crate::models::{IncomingCredential, OpaqueTokenKind, PKCE_TOKEN_PREFIX};
use serde::{Deserialize, Serialize};
use url::Url;

/// Recognised fields of one URL component (fragment or query)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackFields {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token: Option<String>,
    pub token_hash: Option<String>,
    pub code: Option<String>,
    pub type_hint: Option<String>,
    pub flow: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackFields {
    /// Parse an `a=b&c=d` string, keeping the first occurrence of each field
    #[must_use]
    pub fn parse(component: &str) -> Self {
        let mut fields = Self::default();
        let component = component.trim_start_matches(['#', '?']);
        for pair in component.split('&').filter(|pair| !pair.is_empty()) {
            let (name, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = decode_component(raw_value);
            if value.is_empty() {
                continue;
            }
            let slot = match name {
                "access_token" => &mut fields.access_token,
                "refresh_token" => &mut fields.refresh_token,
                "token" => &mut fields.token,
                "token_hash" => &mut fields.token_hash,
                "code" => &mut fields.code,
                "type" => &mut fields.type_hint,
                "flow" => &mut fields.flow,
                "error" => &mut fields.error,
                "error_description" => &mut fields.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        fields
    }

    /// Credentials carried by this component, in conventional check order
    fn credentials(&self) -> Vec<IncomingCredential> {
        let mut credentials = Vec::new();
        if let Some(code) = &self.error {
            credentials.push(IncomingCredential::ProviderError {
                code: code.clone(),
                description: self.error_description.clone(),
            });
        }
        if let (Some(access_token), Some(refresh_token)) = (&self.access_token, &self.refresh_token)
        {
            credentials.push(IncomingCredential::HashTokenPair {
                access_token: access_token.clone(),
                refresh_token: refresh_token.clone(),
            });
        }
        if let Some(code) = &self.code {
            credentials.push(IncomingCredential::AuthorizationCode { code: code.clone() });
        }
        if let Some(token) = &self.token {
            credentials.push(IncomingCredential::OpaqueToken {
                token: token.clone(),
                kind: OpaqueTokenKind::of(token),
                type_hint: self.type_hint.clone(),
            });
        }
        if let Some(hash) = &self.token_hash {
            credentials.push(IncomingCredential::TokenHash {
                hash: hash.clone(),
                type_hint: self.type_hint.clone(),
            });
        }
        credentials
    }
}

/// Raw callback navigation as forwarded by the callback page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackUrl {
    pub url: String,
    #[serde(default)]
    pub fragment: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
}

impl CallbackUrl {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Extract credentials; an unparseable URL yields no credentials at all
    #[must_use]
    pub fn extract(&self) -> ExtractedCallback {
        extract_from_url(&self.url, self.fragment.as_deref(), self.referrer.as_deref())
            .unwrap_or_else(|| extract("", "", self.referrer.as_deref()))
    }
}

/// Everything the flow needs from one callback navigation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedCallback {
    pub fragment: CallbackFields,
    pub query: CallbackFields,
    /// Fragment credentials first, then query credentials
    pub credentials: Vec<IncomingCredential>,
    pub referrer: Option<String>,
}

impl ExtractedCallback {
    /// Explicit `flow` value; query wins over fragment
    #[must_use]
    pub fn flow_hint(&self) -> Option<&str> {
        self.query.flow.as_deref().or(self.fragment.flow.as_deref())
    }

    /// `type` hints from either component
    pub fn type_hints(&self) -> impl Iterator<Item = &str> {
        self.query
            .type_hint
            .as_deref()
            .into_iter()
            .chain(self.fragment.type_hint.as_deref())
    }

    /// First provider-reported error, if any
    #[must_use]
    pub fn provider_error(&self) -> Option<&IncomingCredential> {
        self.credentials
            .iter()
            .find(|credential| matches!(credential, IncomingCredential::ProviderError { .. }))
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.credentials.is_empty()
    }
}

/// Extract credentials from a fragment string, a query string and a referrer
#[must_use]
pub fn extract(fragment: &str, query: &str, referrer: Option<&str>) -> ExtractedCallback {
    let fragment = CallbackFields::parse(fragment);
    let query = CallbackFields::parse(query);

    let mut credentials = fragment.credentials();
    credentials.extend(query.credentials());

    ExtractedCallback {
        fragment,
        query,
        credentials,
        referrer: referrer
            .map(str::trim)
            .filter(|referrer| !referrer.is_empty())
            .map(str::to_string),
    }
}

/// Extract credentials from a full URL, with an optional separately-captured fragment.
///
/// `explicit_fragment` covers pages that forward `location.hash` alongside a
/// URL whose fragment was stripped in transit. Returns `None` if the URL
/// cannot be parsed.
#[must_use]
pub fn extract_from_url(
    url: &str,
    explicit_fragment: Option<&str>,
    referrer: Option<&str>,
) -> Option<ExtractedCallback> {
    let parsed = parse_lenient(url)?;
    let fragment = explicit_fragment
        .filter(|fragment| !fragment.trim_start_matches('#').is_empty())
        .or_else(|| parsed.fragment())
        .unwrap_or("");
    Some(extract(fragment, parsed.query().unwrap_or(""), referrer))
}

/// Find a `pkce_`-prefixed token embedded in a referrer URL (query first, then fragment)
#[must_use]
pub fn extract_referrer_token(referrer: &str) -> Option<String> {
    let parsed = parse_lenient(referrer)?;
    let token = [parsed.query(), parsed.fragment()]
        .into_iter()
        .flatten()
        .filter_map(|component| CallbackFields::parse(component).token)
        .find(|token| token.starts_with(PKCE_TOKEN_PREFIX));
    token
}

// Relative URLs (`/auth/callback?code=...`) are accepted against a dummy base
fn parse_lenient(url: &str) -> Option<Url> {
    Url::parse(url).ok().or_else(|| {
        Url::parse("http://callback.invalid")
            .ok()?
            .join(url)
            .ok()
    })
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).map_or(spaced.clone(), |decoded| decoded.into_owned())
}
