use crate::models::Tier;
use crate::scheduler::RetryState;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthgateSettings {
    pub application: ApplicationSettings,
    pub provider: ProviderSettings,
    pub routes: RouteSettings,
    pub recovery_gate: RetrySettings,
    pub route_guard: RetrySettings,
    pub session: SessionSettings,
    pub cookies: CookieSettings,
    pub logging: LoggingSettings,
    pub protected_views: Vec<ProtectedView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// Public origin used to build the recovery link's `redirect_to`
    pub public_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Auth API root, e.g. `https://project.example.co/auth/v1`
    pub base_url: String,
    /// REST API root used for entitlement lookups
    pub rest_url: String,
    /// Table holding one entitlement row per user
    pub entitlement_table: String,

    // Direct value (can be overridden by environment variable)
    pub api_key: Option<String>,
    // Environment variable name for override
    pub api_key_env: Option<String>,

    pub request_timeout_ms: u64,
}

/// Destinations a finished flow can send the browser to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    pub app_root: String,
    pub password_change: String,
    pub sign_in: String,
    pub upgrade: String,
    /// How long a terminal error stays visible before the redirect
    pub failure_redirect_delay_ms: u64,
}

/// Bounded retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Secret the auth cookie encryption key is derived from
    pub session_secret: String,
    /// Lifetime of the auth cookie in hours
    pub cookie_max_age_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    pub secure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

/// A view served behind the route guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedView {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub requires: Option<Tier>,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9999".to_string(),
            rest_url: "http://localhost:3000".to_string(),
            entitlement_table: "subscriptions".to_string(),
            api_key: None,
            api_key_env: None,
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            app_root: "/".to_string(),
            password_change: "/auth/update-password".to_string(),
            sign_in: "/auth/sign_in".to_string(),
            upgrade: "/pricing".to_string(),
            failure_redirect_delay_ms: 4000,
        }
    }
}

impl RetrySettings {
    /// Two attempts, short then longer, for session propagation
    #[must_use]
    pub const fn recovery_gate_defaults() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 1000,
            max_delay_ms: 2000,
        }
    }

    /// Exponential backoff for entitlement lookups
    #[must_use]
    pub const fn route_guard_defaults() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 4000,
        }
    }

    /// Fresh retry state for one flow instance
    #[must_use]
    pub const fn retry_state(&self) -> RetryState {
        RetryState::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_secret: String::new(), // Will be generated if empty
            cookie_max_age_hours: 24 * 7,
        }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: true, // Default to secure cookies
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for AuthgateSettings {
    fn default() -> Self {
        Self {
            application: ApplicationSettings::default(),
            provider: ProviderSettings::default(),
            routes: RouteSettings::default(),
            recovery_gate: RetrySettings::recovery_gate_defaults(),
            route_guard: RetrySettings::route_guard_defaults(),
            session: SessionSettings::default(),
            cookies: CookieSettings::default(),
            logging: LoggingSettings::default(),
            protected_views: Vec::new(),
        }
    }
}

impl AuthgateSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Logger initialization fails
    /// - Settings file cannot be read or parsed
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_env_file();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);

        Self::initialize_logging(&settings.logging)?;
        settings.ensure_session_secret();

        Ok(settings)
    }

    /// Initialize the logger from the resolved logging settings
    ///
    /// # Errors
    ///
    /// Returns an error if a logger is already installed
    fn initialize_logging(logging: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
        env_logger::Builder::new()
            .parse_filters(&logging.level)
            .try_init()?;
        Ok(())
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `AUTHGATE_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file exists but cannot be read or parsed
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = Path::new("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_file(default_config_path)?;
            println!("✓ Loaded base settings from {}", default_config_path.display());
        }

        if let Ok(secrets_dir) = std::env::var("AUTHGATE_SECRETS_DIR") {
            let secrets_path = Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_file(&secrets_path)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ AUTHGATE_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse one TOML settings file; sections it omits keep their defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(basic_toml::from_str(&content)?)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        if let Ok(host) = std::env::var("HOST") {
            settings.application.host = host;
        }
        if let Some(port) = env_parse::<u16>("PORT") {
            settings.application.port = port;
        }
        if let Ok(url) = std::env::var("PUBLIC_BASE_URL") {
            settings.application.public_base_url = url;
        }

        if let Ok(url) = std::env::var("PROVIDER_URL") {
            settings.provider.base_url = url;
        }
        if let Ok(url) = std::env::var("PROVIDER_REST_URL") {
            settings.provider.rest_url = url;
        }
        if let Ok(key) = std::env::var("PROVIDER_API_KEY") {
            settings.provider.api_key = Some(key);
        }

        if let Some(delay) = env_parse::<u64>("FAILURE_REDIRECT_DELAY_MS") {
            settings.routes.failure_redirect_delay_ms = delay;
        }

        Self::apply_retry_env_overrides("RECOVERY_GATE", &mut settings.recovery_gate);
        Self::apply_retry_env_overrides("ROUTE_GUARD", &mut settings.route_guard);

        if let Ok(secret) = std::env::var("SESSION_SECRET") {
            if !secret.is_empty() {
                settings.session.session_secret = secret;
            }
        }
        if let Some(secure) = env_parse::<bool>("COOKIE_SECURE") {
            settings.cookies.secure = secure;
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            settings.logging.level = level;
        }
    }

    /// `<PREFIX>_MAX_ATTEMPTS`, `<PREFIX>_BASE_DELAY_MS`, `<PREFIX>_MAX_DELAY_MS`
    fn apply_retry_env_overrides(prefix: &str, retry: &mut RetrySettings) {
        if let Some(value) = env_parse(&format!("{prefix}_MAX_ATTEMPTS")) {
            retry.max_attempts = value;
        }
        if let Some(value) = env_parse(&format!("{prefix}_BASE_DELAY_MS")) {
            retry.base_delay_ms = value;
        }
        if let Some(value) = env_parse(&format!("{prefix}_MAX_DELAY_MS")) {
            retry.max_delay_ms = value;
        }
    }

    /// Generate a random session secret if none was configured
    fn ensure_session_secret(&mut self) {
        if self.session.session_secret.is_empty() {
            use rand::RngCore;
            let mut secret = [0u8; 32];
            rand::rng().fill_bytes(&mut secret);
            self.session.session_secret = general_purpose::STANDARD.encode(secret);
            log::warn!(
                "Using auto-generated session secret; auth cookies will not survive a restart"
            );
            log::warn!(
                "Set SESSION_SECRET or session.session_secret in Settings.toml for production"
            );
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Find a protected view by name
    #[must_use]
    pub fn get_protected_view(&self, name: &str) -> Option<&ProtectedView> {
        self.protected_views.iter().find(|view| view.name == name)
    }

    /// Absolute callback URL the identity provider should redirect to
    #[must_use]
    pub fn callback_url(&self) -> String {
        format!(
            "{}/auth/callback",
            self.application.public_base_url.trim_end_matches('/')
        )
    }
}

impl ProviderSettings {
    /// Get the API key, checking environment variable first, then falling back to direct value
    #[must_use]
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(env_var) = &self.api_key_env {
            if let Ok(value) = std::env::var(env_var) {
                return Some(value);
            }
        }
        self.api_key.clone()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    // Helper function to clean all relevant environment variables for tests
    fn clean_env_vars() {
        for var in [
            "SESSION_SECRET",
            "PROVIDER_URL",
            "PROVIDER_API_KEY",
            "FAILURE_REDIRECT_DELAY_MS",
            "RECOVERY_GATE_MAX_ATTEMPTS",
            "ROUTE_GUARD_BASE_DELAY_MS",
            "COOKIE_SECURE",
            "AUTHGATE_TEST_KEY",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_section_defaults() {
        let settings = AuthgateSettings::default();
        assert_eq!(settings.recovery_gate.max_attempts, 2);
        assert_eq!(settings.recovery_gate.base_delay_ms, 1000);
        assert_eq!(settings.recovery_gate.max_delay_ms, 2000);
        assert_eq!(settings.route_guard.max_attempts, 4);
        assert_eq!(settings.routes.failure_redirect_delay_ms, 4000);
        assert!(settings.cookies.secure);
        assert_eq!(settings.session.session_secret, "");
    }

    #[test]
    fn test_recovery_gate_retry_state_is_short_then_longer() {
        let mut retry = RetrySettings::recovery_gate_defaults().retry_state();
        let first = retry.next_delay().unwrap();
        let second = retry.next_delay().unwrap();
        assert!(first < second);
        assert!(retry.next_delay().is_none());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clean_env_vars();
        std::env::set_var("PROVIDER_URL", "https://auth.example.com/auth/v1");
        std::env::set_var("FAILURE_REDIRECT_DELAY_MS", "3000");
        std::env::set_var("RECOVERY_GATE_MAX_ATTEMPTS", "3");
        std::env::set_var("ROUTE_GUARD_BASE_DELAY_MS", "not-a-number");
        std::env::set_var("COOKIE_SECURE", "false");

        let mut settings = AuthgateSettings::default();
        AuthgateSettings::apply_env_overrides(&mut settings);

        assert_eq!(settings.provider.base_url, "https://auth.example.com/auth/v1");
        assert_eq!(settings.routes.failure_redirect_delay_ms, 3000);
        assert_eq!(settings.recovery_gate.max_attempts, 3);
        // Unparseable values leave the default in place
        assert_eq!(settings.route_guard.base_delay_ms, 500);
        assert!(!settings.cookies.secure);

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_empty_session_secret_env_is_ignored() {
        clean_env_vars();
        std::env::set_var("SESSION_SECRET", "");
        let mut settings = AuthgateSettings::default();
        settings.session.session_secret = "from-file".to_string();
        AuthgateSettings::apply_env_overrides(&mut settings);
        assert_eq!(settings.session.session_secret, "from-file");
        clean_env_vars();
    }

    #[test]
    fn test_session_secret_generation() {
        let mut settings = AuthgateSettings::default();
        settings.ensure_session_secret();
        assert_eq!(settings.session.session_secret.len(), 44);

        let existing = settings.session.session_secret.clone();
        settings.ensure_session_secret();
        assert_eq!(settings.session.session_secret, existing);
    }

    #[test]
    #[serial]
    fn test_api_key_env_precedence() {
        clean_env_vars();
        let mut provider = ProviderSettings {
            api_key: Some("direct".to_string()),
            api_key_env: Some("AUTHGATE_TEST_KEY".to_string()),
            ..ProviderSettings::default()
        };
        assert_eq!(provider.get_api_key().as_deref(), Some("direct"));

        std::env::set_var("AUTHGATE_TEST_KEY", "from-env");
        assert_eq!(provider.get_api_key().as_deref(), Some("from-env"));

        provider.api_key_env = None;
        assert_eq!(provider.get_api_key().as_deref(), Some("direct"));
        clean_env_vars();
    }

    #[test]
    fn test_from_file_keeps_missing_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[routes]
app_root = "/dashboard"
password_change = "/account/password"
sign_in = "/login"
upgrade = "/billing/upgrade"
failure_redirect_delay_ms = 5000

[[protected_views]]
name = "reports"
title = "Reports"
requires = "enterprise"

[[protected_views]]
name = "account"
title = "Account"
"#
        )
        .unwrap();

        let settings = AuthgateSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.routes.app_root, "/dashboard");
        assert_eq!(settings.routes.failure_redirect_delay_ms, 5000);
        assert_eq!(settings.recovery_gate, RetrySettings::recovery_gate_defaults());
        assert_eq!(settings.route_guard, RetrySettings::route_guard_defaults());

        let reports = settings.get_protected_view("reports").unwrap();
        assert_eq!(reports.requires, Some(Tier::Enterprise));
        assert_eq!(settings.get_protected_view("account").unwrap().requires, None);
        assert!(settings.get_protected_view("missing").is_none());
    }

    #[test]
    fn test_callback_url() {
        let mut settings = AuthgateSettings::default();
        settings.application.public_base_url = "https://shop.example.com/".to_string();
        assert_eq!(settings.callback_url(), "https://shop.example.com/auth/callback");
    }
}
