// Password recovery, password change and sign-out handlers
use crate::callback::RecoveryGate;
use crate::error::AuthFlowError;
use crate::provider::{GoTrueClient, IdentityProvider};
use crate::scheduler::FlowRegistry;
use crate::settings::AuthgateSettings;
use crate::utils::cookie_utils::{
    create_expired_cookie, AuthCookies, AUTH_STATE_COOKIE, RECOVERY_FLAG_COOKIE,
};
use crate::utils::logging::LoggingHelper;
use crate::utils::responses::ResponseBuilder;
use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Result};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

const PASSWORD_SLOT: &str = "password";

#[derive(Debug, Deserialize)]
pub struct RecoverRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Deserialize)]
pub struct PasswordRequest {
    #[serde(default)]
    pub password: String,
}

/// Send a password-recovery email and mark this browser as expecting one
///
/// # Errors
///
/// Returns an error if the resulting cookies cannot be encrypted.
pub async fn request_recovery(
    req: HttpRequest,
    body: web::Json<RecoverRequest>,
    settings: web::Data<AuthgateSettings>,
    provider: web::Data<GoTrueClient>,
) -> Result<HttpResponse> {
    let email = body.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Ok(ResponseBuilder::missing_field("email"));
    }

    let cookies = AuthCookies::from_settings(&settings);
    let (context, _) = cookies.flow_context(&req);
    let browser_provider = provider.for_context(&context, cookies.read_auth_state(&req));
    let redirect_to = format!("{}?flow=recovery", settings.callback_url());

    if let Err(e) = browser_provider
        .request_password_recovery(email, &redirect_to)
        .await
    {
        return Ok(ResponseBuilder::from_provider_error(&e));
    }
    info!("Password recovery requested");

    let response_cookies = vec![
        cookies
            .auth_state_cookie(&browser_provider.snapshot())
            .map_err(actix_web::error::ErrorInternalServerError)?,
        cookies
            .recovery_flag_cookie(true)
            .map_err(actix_web::error::ErrorInternalServerError)?,
    ];
    Ok(ResponseBuilder::json_with_cookies(
        &json!({
            "status": "sent",
            "message": "If an account exists for that address, a reset link is on its way.",
        }),
        response_cookies,
    ))
}

/// Set a new password once the recovery session is visible
///
/// Only a session established by a password-recovery link may do this; an
/// ordinary sign-in session is refused.
///
/// # Errors
///
/// Returns an error if the resulting cookie cannot be encrypted.
pub async fn update_password(
    req: HttpRequest,
    body: web::Json<PasswordRequest>,
    settings: web::Data<AuthgateSettings>,
    provider: web::Data<GoTrueClient>,
    registry: web::Data<FlowRegistry>,
) -> Result<HttpResponse> {
    if body.password.is_empty() {
        return Ok(ResponseBuilder::missing_field("password"));
    }

    let cookies = AuthCookies::from_settings(&settings);
    let (context, _) = cookies.flow_context(&req);
    let browser_provider = provider.for_context(&context, cookies.read_auth_state(&req));

    let pacer = registry.begin(&context, PASSWORD_SLOT);
    let gate = RecoveryGate::new(&browser_provider, settings.recovery_gate);
    let gated = gate.ensure_session(&pacer).await;
    registry.finish(&context, PASSWORD_SLOT, &pacer);
    if let Err(e) = gated {
        if e == AuthFlowError::Cancelled {
            LoggingHelper::log_flow_cancelled(&context, PASSWORD_SLOT);
        }
        return Ok(ResponseBuilder::from_flow_error(&e));
    }

    if !browser_provider.is_recovery_session() {
        warn!("Password change refused: session was not established by a recovery link");
        return Ok(ResponseBuilder::error(
            StatusCode::FORBIDDEN,
            "recovery_required",
            "Open the password reset link from your email to set a new password.",
        ));
    }

    if let Err(e) = browser_provider.update_password(&body.password).await {
        return Ok(ResponseBuilder::from_provider_error(&e));
    }

    let auth_cookie = cookies
        .auth_state_cookie(&browser_provider.snapshot())
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(ResponseBuilder::json_with_cookies(
        &json!({
            "status": "updated",
            "redirect_to": settings.routes.app_root,
        }),
        vec![auth_cookie],
    ))
}

/// End the session and return to the sign-in page
///
/// # Errors
///
/// Never fails; the signature matches the other handlers.
pub async fn sign_out(
    req: HttpRequest,
    settings: web::Data<AuthgateSettings>,
    provider: web::Data<GoTrueClient>,
    registry: web::Data<FlowRegistry>,
) -> Result<HttpResponse> {
    let cookies = AuthCookies::from_settings(&settings);
    let (context, _) = cookies.flow_context(&req);
    let browser_provider = provider.for_context(&context, cookies.read_auth_state(&req));

    // Revocation failures are logged by the client; the local session is gone either way.
    let _ = browser_provider.sign_out().await;
    registry.cancel(&context);

    Ok(ResponseBuilder::see_other(
        &settings.routes.sign_in,
        vec![
            create_expired_cookie(AUTH_STATE_COOKIE, settings.cookies.secure),
            create_expired_cookie(RECOVERY_FLAG_COOKIE, settings.cookies.secure),
        ],
    ))
}
