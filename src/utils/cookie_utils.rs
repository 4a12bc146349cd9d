use crate::provider::StoredAuthState;
use crate::settings::AuthgateSettings;
use crate::utils::crypto::CookieCipher;
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::HttpRequest;
use anyhow::Result;
use log::debug;
use uuid::Uuid;

/// Encrypted provider auth state (session tokens, PKCE verifier)
pub const AUTH_STATE_COOKIE: &str = "authgate_auth";
/// Encrypted one-shot recovery flag
pub const RECOVERY_FLAG_COOKIE: &str = "authgate_recovery";
/// Browser context id used to key live flows
pub const FLOW_CONTEXT_COOKIE: &str = "authgate_flow";

/// Recovery links are expected to be clicked within this window
const RECOVERY_FLAG_MAX_AGE_HOURS: i64 = 1;

/// Options for cookie creation
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub path: String,
    pub max_age: CookieDuration,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
            same_site: SameSite::Lax,
            path: "/".to_string(),
            max_age: CookieDuration::hours(24),
        }
    }
}

impl CookieOptions {
    fn build(&self, name: &str, value: String) -> Cookie<'static> {
        Cookie::build(name.to_owned(), value)
            .http_only(self.http_only)
            .secure(self.secure)
            .same_site(self.same_site)
            .path(self.path.clone())
            .max_age(self.max_age)
            .finish()
    }
}

/// Reads and writes the auth cookies of one deployment
pub struct AuthCookies {
    cipher: CookieCipher,
    secure: bool,
    max_age_hours: i64,
}

impl AuthCookies {
    #[must_use]
    pub fn from_settings(settings: &AuthgateSettings) -> Self {
        Self {
            cipher: CookieCipher::from_secret(settings.session.session_secret.as_bytes()),
            secure: settings.cookies.secure,
            max_age_hours: settings.session.cookie_max_age_hours,
        }
    }

    /// Provider auth state carried by the request; empty when absent or unreadable
    #[must_use]
    pub fn read_auth_state(&self, req: &HttpRequest) -> StoredAuthState {
        req.cookie(AUTH_STATE_COOKIE)
            .and_then(|cookie| match self.cipher.open(cookie.value()) {
                Ok(state) => Some(state),
                Err(e) => {
                    debug!("Ignoring unreadable auth state cookie: {e}");
                    None
                }
            })
            .unwrap_or_default()
    }

    /// Cookie persisting `state`, or a removal cookie when there is nothing to keep
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be encrypted.
    pub fn auth_state_cookie(&self, state: &StoredAuthState) -> Result<Cookie<'static>> {
        if state.is_empty() {
            return Ok(create_expired_cookie(AUTH_STATE_COOKIE, self.secure));
        }
        let value = self.cipher.seal(state)?;
        Ok(self
            .options(CookieDuration::hours(self.max_age_hours))
            .build(AUTH_STATE_COOKIE, value))
    }

    /// Whether this browser asked for a recovery email
    #[must_use]
    pub fn recovery_requested(&self, req: &HttpRequest) -> bool {
        req.cookie(RECOVERY_FLAG_COOKIE)
            .and_then(|cookie| self.cipher.open::<bool>(cookie.value()).ok())
            .unwrap_or(false)
    }

    /// Cookie setting the recovery flag, or removing it once cleared
    ///
    /// # Errors
    ///
    /// Returns an error if the flag cannot be encrypted.
    pub fn recovery_flag_cookie(&self, requested: bool) -> Result<Cookie<'static>> {
        if !requested {
            return Ok(create_expired_cookie(RECOVERY_FLAG_COOKIE, self.secure));
        }
        let value = self.cipher.seal(&true)?;
        Ok(self
            .options(CookieDuration::hours(RECOVERY_FLAG_MAX_AGE_HOURS))
            .build(RECOVERY_FLAG_COOKIE, value))
    }

    /// Browser context id, plus a cookie to set when a new one was minted
    #[must_use]
    pub fn flow_context(&self, req: &HttpRequest) -> (String, Option<Cookie<'static>>) {
        if let Some(context) = req
            .cookie(FLOW_CONTEXT_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| Uuid::parse_str(value).is_ok())
        {
            return (context, None);
        }
        let context = Uuid::new_v4().to_string();
        let cookie = self
            .options(CookieDuration::hours(self.max_age_hours))
            .build(FLOW_CONTEXT_COOKIE, context.clone());
        (context, Some(cookie))
    }

    fn options(&self, max_age: CookieDuration) -> CookieOptions {
        CookieOptions {
            secure: self.secure,
            max_age,
            ..CookieOptions::default()
        }
    }
}

/// Create an expired cookie to clear a specific cookie
#[must_use]
pub fn create_expired_cookie(name: &str, secure: bool) -> Cookie<'static> {
    Cookie::build(name.to_owned(), "")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(CookieDuration::seconds(-1))
        .finish()
}
