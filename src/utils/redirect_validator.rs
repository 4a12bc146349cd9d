use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

// Path traversal, the most common attack on return-to parameters
static PATH_TRAVERSAL_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\.\.").ok());

// Scheme prefixes and protocol-relative starts
static PROTOCOL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)^(?:[a-z][a-z0-9+.-]*:)|(?:/{2,})").ok());

// Control characters, encoded line breaks, backslashes and invisible separators
static SUSPICIOUS_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)[\x00-\x1F\x7F-\x9F]|%(?:00|0[aAdD]|09|5c)|\\|[\u{200E}\u{200F}\u{2060}-\u{2064}\u{2000}-\u{200A}]").ok()
});

const MAX_RETURN_TO_LENGTH: usize = 2048;

const DANGEROUS_PROTOCOLS: &[&str] = &["javascript:", "vbscript:", "data:", "file:", "ftp:"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid return-to location: {reason}")]
pub struct InvalidRedirect {
    pub reason: &'static str,
}

/// Validate a post-sign-in return location.
///
/// Only same-origin relative paths are accepted; every absolute or
/// protocol-relative URL is refused.
///
/// # Errors
///
/// Returns [`InvalidRedirect`] naming the first check that failed.
pub fn validate_return_to(location: &str) -> Result<String, InvalidRedirect> {
    debug!("Validating return-to location: {location}");

    if location.len() > MAX_RETURN_TO_LENGTH {
        return reject(location, "too long");
    }
    if !location.starts_with('/') || location.starts_with("//") {
        return reject(location, "not a relative path");
    }

    for variant in decoded_variants(location) {
        if matches(&PATH_TRAVERSAL_PATTERN, &variant) {
            return reject(location, "path traversal");
        }
        if matches(&PROTOCOL_PATTERN, &variant) {
            return reject(location, "protocol injection");
        }
        if matches(&SUSPICIOUS_PATTERN, &variant) {
            return reject(location, "suspicious characters");
        }
        let lower = variant.to_lowercase();
        if DANGEROUS_PROTOCOLS.iter().any(|protocol| lower.contains(protocol)) {
            return reject(location, "dangerous protocol");
        }
        if variant.matches('@').count() > 1 {
            return reject(location, "domain confusion");
        }
    }

    Ok(location.to_string())
}

/// Validated return location, or the fallback if validation fails
#[must_use]
pub fn sanitize_return_to(location: Option<&str>, fallback: &str) -> String {
    location
        .and_then(|location| validate_return_to(location).ok())
        .unwrap_or_else(|| fallback.to_string())
}

fn reject(location: &str, reason: &'static str) -> Result<String, InvalidRedirect> {
    warn!("Refusing return-to location ({reason}): {location}");
    Err(InvalidRedirect { reason })
}

// A pattern that failed to compile matches everything, so validation fails closed
fn matches(pattern: &Lazy<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().map_or(true, |regex| regex.is_match(text))
}

/// Original, single-decoded and double-decoded forms
fn decoded_variants(location: &str) -> Vec<String> {
    let mut variants = vec![location.to_string()];
    if let Ok(decoded) = urlencoding::decode(location) {
        let decoded = decoded.into_owned();
        if decoded != location {
            if let Ok(double_decoded) = urlencoding::decode(&decoded) {
                let double_decoded = double_decoded.into_owned();
                if double_decoded != decoded {
                    variants.push(double_decoded);
                }
            }
            variants.push(decoded);
        }
    }
    variants
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legitimate_return_locations() {
        for location in ["/", "/app/reports", "/app/reports?tab=weekly", "/app/billing#plans"] {
            assert_eq!(validate_return_to(location).as_deref(), Ok(location));
        }
    }

    #[test]
    fn test_open_redirects_blocked() {
        for location in [
            "//evil.com",
            "///evil.com",
            "https://evil.com",
            "http:/evil.com",
            "evil.com/app",
            "javascript:alert(1)",
        ] {
            assert!(validate_return_to(location).is_err(), "{location}");
        }
    }

    #[test]
    fn test_encoded_attacks_blocked() {
        for location in [
            "/app/../../etc/passwd",
            "/app/%2e%2e/%2e%2e/etc",
            "/app/%252e%252e/admin",
            "/path%0d%0aSet-Cookie:x",
            "/redirect?to=javascript%3Aalert(1)",
            "/a\\b",
            "/x@a.com@evil.com",
        ] {
            assert!(validate_return_to(location).is_err(), "{location}");
        }
    }

    #[test]
    fn test_too_long_blocked() {
        let location = format!("/app/{}", "a".repeat(MAX_RETURN_TO_LENGTH));
        assert_eq!(
            validate_return_to(&location),
            Err(InvalidRedirect { reason: "too long" })
        );
    }

    #[test]
    fn test_sanitize_falls_back() {
        assert_eq!(sanitize_return_to(Some("/app/reports"), "/"), "/app/reports");
        assert_eq!(sanitize_return_to(Some("https://evil.com"), "/"), "/");
        assert_eq!(sanitize_return_to(None, "/"), "/");
    }
}
