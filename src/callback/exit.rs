// Single exit point of the callback flow

use crate::callback::flag::RecoveryFlag;
use crate::error::AuthFlowError;
use crate::models::{FlowIntent, ResolvedSession, Route};
use crate::settings::RouteSettings;
use crate::utils::logging::LoggingHelper;

/// Terminal result of a callback flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOutcome {
    pub intent: FlowIntent,
    pub route: Route,
    pub session: Option<ResolvedSession>,
    pub error: Option<AuthFlowError>,
}

impl FlowOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Compute the route for a terminal result, then clear the recovery flag.
///
/// Every success and failure path of the callback flow ends here, and the
/// flag is cleared as the very last step. Cancelled flows never reach it.
pub fn finish(
    intent: FlowIntent,
    result: Result<ResolvedSession, AuthFlowError>,
    flag: &dyn RecoveryFlag,
) -> FlowOutcome {
    let outcome = match result {
        Ok(session) => FlowOutcome {
            intent,
            route: match intent {
                FlowIntent::SignIn => Route::AppRoot,
                FlowIntent::PasswordRecovery => Route::PasswordChange,
            },
            session: Some(session),
            error: None,
        },
        Err(error) => FlowOutcome {
            intent,
            route: Route::SignIn {
                error_code: error.code().to_string(),
                message: error.user_message(),
            },
            session: None,
            error: Some(error),
        },
    };
    LoggingHelper::log_flow_finished(intent, &outcome.route, outcome.error.as_ref());

    flag.clear();
    outcome
}

/// Concrete redirect location for a route
#[must_use]
pub fn redirect_target(route: &Route, routes: &RouteSettings) -> String {
    match route {
        Route::AppRoot => routes.app_root.clone(),
        Route::PasswordChange => routes.password_change.clone(),
        Route::SignIn {
            error_code,
            message,
        } => format!(
            "{}?error={}&message={}",
            routes.sign_in,
            urlencoding::encode(error_code),
            urlencoding::encode(message)
        ),
    }
}
