//! One-shot "recovery requested" flag
//!
//! Set when a password-recovery email is requested, read by the classifier,
//! cleared by [`crate::callback::exit::finish`] and nowhere else.

use std::sync::atomic::{AtomicBool, Ordering};

/// Persisted marker that a recovery email was requested from this browser
pub trait RecoveryFlag: Send + Sync {
    fn is_requested(&self) -> bool;
    fn set_requested(&self);
    fn clear(&self);
}

/// Flag held in memory for the lifetime of one request.
///
/// The HTTP layer seeds it from the flag cookie and writes the cookie back
/// (or removes it) once the flow has finished.
#[derive(Debug, Default)]
pub struct MemoryRecoveryFlag {
    requested: AtomicBool,
}

impl MemoryRecoveryFlag {
    #[must_use]
    pub const fn new(requested: bool) -> Self {
        Self {
            requested: AtomicBool::new(requested),
        }
    }
}

impl RecoveryFlag for MemoryRecoveryFlag {
    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn set_requested(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}
