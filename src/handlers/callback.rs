// Authentication callback handlers
use crate::callback::{
    classify, redirect_target, CallbackFlow, CallbackUrl, FlowOutcome, MemoryRecoveryFlag,
    RecoveryFlag,
};
use crate::error::AuthFlowError;
use crate::models::{FlowIntent, Route};
use crate::provider::GoTrueClient;
use crate::scheduler::FlowRegistry;
use crate::settings::AuthgateSettings;
use crate::utils::cookie_utils::AuthCookies;
use crate::utils::logging::LoggingHelper;
use crate::utils::responses::ResponseBuilder;
use actix_web::{web, HttpRequest, HttpResponse, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use log::{error, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Body returned to the callback page
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolveResponse {
    /// `resolved`, `failed` or `cancelled`
    pub status: String,
    pub intent: FlowIntent,
    pub message: Option<String>,
    pub error: Option<String>,
    pub redirect_to: String,
    /// How long the page shows `message` before following `redirect_to`
    pub redirect_delay_ms: u64,
}

impl ResolveResponse {
    #[must_use]
    pub fn from_outcome(outcome: &FlowOutcome, settings: &AuthgateSettings) -> Self {
        let redirect_to = redirect_target(&outcome.route, &settings.routes);
        match &outcome.error {
            None => Self {
                status: "resolved".to_string(),
                intent: outcome.intent,
                message: None,
                error: None,
                redirect_to,
                redirect_delay_ms: 0,
            },
            Some(error) => Self {
                status: "failed".to_string(),
                intent: outcome.intent,
                message: Some(error.user_message()),
                error: Some(error.code().to_string()),
                redirect_to,
                redirect_delay_ms: settings.routes.failure_redirect_delay_ms,
            },
        }
    }

    /// Reply to a flow that was superseded before it finished
    #[must_use]
    pub fn cancelled(intent: FlowIntent, settings: &AuthgateSettings) -> Self {
        let error = AuthFlowError::Cancelled;
        Self {
            status: "cancelled".to_string(),
            intent,
            message: Some("This sign-in was replaced by a newer one.".to_string()),
            error: Some(error.code().to_string()),
            redirect_to: settings.routes.sign_in.clone(),
            redirect_delay_ms: settings.routes.failure_redirect_delay_ms,
        }
    }
}

/// Resolve a forwarded callback URL into a session
///
/// The callback page posts `location.href`, `location.hash` and
/// `document.referrer`; the response tells it where to go next.
///
/// # Errors
///
/// Returns an error if the resulting cookies cannot be encrypted.
pub async fn resolve_callback(
    req: HttpRequest,
    body: web::Json<CallbackUrl>,
    settings: web::Data<AuthgateSettings>,
    provider: web::Data<GoTrueClient>,
    registry: web::Data<FlowRegistry>,
) -> Result<HttpResponse> {
    let cookies = AuthCookies::from_settings(&settings);
    let (context, context_cookie) = cookies.flow_context(&req);
    let browser_provider = provider.for_context(&context, cookies.read_auth_state(&req));
    let carried_token = browser_provider
        .snapshot()
        .session
        .map(|session| session.access_token);
    let flag = MemoryRecoveryFlag::new(cookies.recovery_requested(&req));

    let slot = callback_slot(&body);
    let pacer = registry.begin(&context, &slot);
    let result = CallbackFlow::new(&browser_provider, &flag)
        .with_recovery_gate(settings.recovery_gate)
        .run(&body, &pacer)
        .await;
    registry.finish(&context, &slot, &pacer);

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(AuthFlowError::Cancelled) => {
            LoggingHelper::log_flow_cancelled(&context, &slot);
            let intent = classify(&body.extract(), flag.is_requested()).intent;
            return Ok(HttpResponse::Conflict().json(ResolveResponse::cancelled(intent, &settings)));
        }
        Err(e) => {
            error!("Callback flow ended outside its exit path: {e}");
            return Ok(ResponseBuilder::from_flow_error(&e));
        }
    };

    // Only a session this recovery flow established may change the password
    let established_here = outcome
        .session
        .as_ref()
        .is_some_and(|session| carried_token.as_deref() != Some(session.access_token.as_str()));
    if outcome.route == Route::PasswordChange && established_here {
        info!("Recovery session established; password change allowed");
        browser_provider.mark_recovery_session();
    }

    let mut response_cookies = vec![
        cookies
            .auth_state_cookie(&browser_provider.snapshot())
            .map_err(actix_web::error::ErrorInternalServerError)?,
        cookies
            .recovery_flag_cookie(flag.is_requested())
            .map_err(actix_web::error::ErrorInternalServerError)?,
    ];
    response_cookies.extend(context_cookie);

    let body = ResolveResponse::from_outcome(&outcome, &settings);
    Ok(ResponseBuilder::json_with_cookies(&body, response_cookies))
}

/// Registry slot of a callback: reloading the same link supersedes the
/// earlier instance, a different link runs alongside it
fn callback_slot(callback: &CallbackUrl) -> String {
    let mut hasher = Sha256::new();
    hasher.update(callback.url.as_bytes());
    hasher.update(b"#");
    hasher.update(callback.fragment.as_deref().unwrap_or_default().as_bytes());
    let digest = hasher.finalize();
    format!("callback:{}", URL_SAFE_NO_PAD.encode(&digest[..12]))
}
