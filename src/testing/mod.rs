//! Testing utilities for authgate
//!
//! - [`fixtures`] - pre-built sessions, entitlements and settings
//! - [`mock`] - scripted identity provider, entitlement source and progress reporter
//!
//! ```rust,ignore
//! use authgate::testing::{MockIdentityProvider, TestFixtures};
//!
//! let provider = MockIdentityProvider::new().accept_code("abc", TestFixtures::session());
//! ```

pub mod fixtures;
pub mod mock;

pub use fixtures::TestFixtures;
pub use mock::{
    MockEntitlementSource, MockIdentityProvider, ProviderCall, RecordingProgress,
};

/// Common test constants
pub mod constants {
    pub const TEST_USER_ID: &str = "00000000-0000-4000-8000-000000000001";
    pub const TEST_EMAIL: &str = "test@example.com";
    pub const TEST_SESSION_SECRET: &str = "test-session-secret-with-enough-entropy";
}
