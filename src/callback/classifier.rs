// Flow intent classification: sign-in or password recovery

use crate::callback::extractor::ExtractedCallback;
use crate::models::{FlowIntent, IntentSource};

const RECOVERY: &str = "recovery";

/// Classified intent plus the signal that decided it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub intent: FlowIntent,
    pub source: IntentSource,
}

/// Decide the flow intent.
///
/// Pure: reading the persisted flag is the caller's job, so classifying the
/// same input twice always gives the same answer. Signals are checked in
/// precedence order `flow` parameter, `type` hint, persisted flag.
#[must_use]
pub fn classify(extracted: &ExtractedCallback, flag_requested: bool) -> Classification {
    if extracted.flow_hint() == Some(RECOVERY) {
        return Classification {
            intent: FlowIntent::PasswordRecovery,
            source: IntentSource::FlowParameter,
        };
    }
    if extracted.type_hints().any(|hint| hint == RECOVERY) {
        return Classification {
            intent: FlowIntent::PasswordRecovery,
            source: IntentSource::TypeHint,
        };
    }
    if flag_requested {
        return Classification {
            intent: FlowIntent::PasswordRecovery,
            source: IntentSource::PersistedFlag,
        };
    }
    Classification {
        intent: FlowIntent::SignIn,
        source: IntentSource::Default,
    }
}
