// HTTP-level tests for the auth endpoints; the identity provider is either
// unreachable or a wiremock server
use super::{configure_services, ResolveResponse};
use crate::guard::{EntitlementError, EntitlementSource};
use crate::models::{FlowIntent, Tier};
use crate::provider::{GoTrueClient, StoredAuthState};
use crate::scheduler::FlowRegistry;
use crate::settings::{AuthgateSettings, RetrySettings};
use crate::testing::{MockEntitlementSource, TestFixtures};
use crate::utils::cookie_utils::{
    AuthCookies, AUTH_STATE_COOKIE, FLOW_CONTEXT_COOKIE, RECOVERY_FLAG_COOKIE,
};
use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use actix_web::{http::header, http::StatusCode, test, web, App};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

const UNREACHABLE_PROVIDER: &str = "http://127.0.0.1:9";

fn settings() -> AuthgateSettings {
    let mut settings = TestFixtures::settings();
    settings.recovery_gate = RetrySettings {
        max_attempts: 1,
        base_delay_ms: 1,
        max_delay_ms: 1,
    };
    settings
}

fn gate(max_attempts: u32, delay_ms: u64) -> RetrySettings {
    RetrySettings {
        max_attempts,
        base_delay_ms: delay_ms,
        max_delay_ms: delay_ms,
    }
}

fn context_cookie() -> Cookie<'static> {
    Cookie::new(FLOW_CONTEXT_COOKIE, uuid::Uuid::new_v4().to_string())
}

fn auth_cookie(settings: &AuthgateSettings, recovery: bool) -> Cookie<'static> {
    AuthCookies::from_settings(settings)
        .auth_state_cookie(&StoredAuthState {
            session: Some(TestFixtures::session()),
            code_verifier: None,
            recovery,
        })
        .unwrap()
}

fn returned_auth_state(settings: &AuthgateSettings, resp: &ServiceResponse) -> StoredAuthState {
    let cookie = resp
        .response()
        .cookies()
        .find(|cookie| cookie.name() == AUTH_STATE_COOKIE)
        .unwrap()
        .into_owned();
    let req = test::TestRequest::default().cookie(cookie).to_http_request();
    AuthCookies::from_settings(settings).read_auth_state(&req)
}

macro_rules! app {
    ($settings:expr) => {
        app!($settings, UNREACHABLE_PROVIDER)
    };
    ($settings:expr, $provider_url:expr) => {
        app!(
            $settings,
            $provider_url,
            MockEntitlementSource::returning(Some(TestFixtures::entitlement(Tier::Pro)))
        )
    };
    ($settings:expr, $provider_url:expr, $entitlements:expr) => {{
        let provider =
            GoTrueClient::with_http_client(reqwest::Client::new(), &$provider_url, "anon-key");
        let entitlements: Arc<dyn EntitlementSource> = Arc::new($entitlements);
        test::init_service(
            App::new()
                .app_data(web::Data::new($settings))
                .app_data(web::Data::new(provider))
                .app_data(web::Data::new(FlowRegistry::new()))
                .app_data(web::Data::from(entitlements))
                .configure(configure_services),
        )
        .await
    }};
}

#[actix_web::test]
async fn test_health() {
    let app = app!(settings());
    let resp = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_callback_page_is_not_cached() {
    let app = app!(settings());
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/auth/callback?code=abc").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
    let body = test::read_body(resp).await;
    assert!(std::str::from_utf8(&body).unwrap().contains("/auth/callback/resolve"));
}

#[actix_web::test]
async fn test_resolve_provider_error_clears_flag() {
    let settings = settings();
    let flag_cookie = AuthCookies::from_settings(&settings)
        .recovery_flag_cookie(true)
        .unwrap();
    let app = app!(settings);

    let req = test::TestRequest::post()
        .uri("/auth/callback/resolve")
        .cookie(flag_cookie)
        .set_json(json!({
            "url": "https://shop.example.com/auth/callback\
                    ?error=access_denied&error_description=Link+expired",
            "referrer": null,
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cleared = resp
        .response()
        .cookies()
        .find(|cookie| cookie.name() == RECOVERY_FLAG_COOKIE)
        .unwrap();
    assert_eq!(cleared.value(), "");

    let body: ResolveResponse = test::read_body_json(resp).await;
    assert_eq!(body.status, "failed");
    assert_eq!(body.intent, FlowIntent::PasswordRecovery);
    assert_eq!(body.message.as_deref(), Some("Link expired"));
    assert_eq!(body.redirect_delay_ms, 4000);
    assert!(body.redirect_to.starts_with("/auth/sign_in?error=access_denied"));
}

#[actix_web::test]
async fn test_resolve_without_credentials() {
    let app = app!(settings());
    let req = test::TestRequest::post()
        .uri("/auth/callback/resolve")
        .set_json(json!({ "url": "https://shop.example.com/auth/callback" }))
        .to_request();
    let body: ResolveResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body.status, "failed");
    assert_eq!(body.intent, FlowIntent::SignIn);
    assert_eq!(body.error.as_deref(), Some("no_credentials"));
    assert_eq!(
        body.message.as_deref(),
        Some("No valid authentication parameters found")
    );
}

#[actix_web::test]
async fn test_protected_view_without_session_redirects() {
    let app = app!(settings());
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/app/reports?tab=weekly").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        resp.headers().get(header::LOCATION).unwrap(),
        "/auth/sign_in?return_to=%2Fapp%2Freports%3Ftab%3Dweekly"
    );
}

#[actix_web::test]
async fn test_unknown_view_is_not_found() {
    let app = app!(settings());
    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/app/missing").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_recover_requires_email() {
    let app = app!(settings());
    let req = test::TestRequest::post()
        .uri("/auth/recover")
        .set_json(json!({ "email": "  " }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_password_change_without_session_times_out() {
    let app = app!(settings());
    let req = test::TestRequest::post()
        .uri("/auth/password")
        .set_json(json!({ "password": "correct horse battery staple" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "recovery_timeout");
}

#[actix_web::test]
async fn test_sign_out_clears_cookies() {
    let app = app!(settings());
    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/auth/sign_out").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/auth/sign_in");
    assert_eq!(resp.response().cookies().count(), 2);
}

#[actix_web::test]
async fn test_password_change_refuses_ordinary_session() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("PUT"))
        .and(matchers::path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "u1" })))
        .expect(0)
        .mount(&server)
        .await;
    let settings = settings();
    let cookie = auth_cookie(&settings, false);
    let app = app!(settings, server.uri());

    let req = test::TestRequest::post()
        .uri("/auth/password")
        .cookie(cookie)
        .set_json(json!({ "password": "attacker-chosen" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "recovery_required");
}

#[actix_web::test]
async fn test_password_change_with_recovery_session() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("PUT"))
        .and(matchers::path("/user"))
        .and(matchers::bearer_token(TestFixtures::session().access_token))
        .and(matchers::body_json(json!({ "password": "correct horse battery staple" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "u1" })))
        .expect(1)
        .mount(&server)
        .await;
    let settings = settings();
    let cookie = auth_cookie(&settings, true);
    let app = app!(settings.clone(), server.uri());

    let req = test::TestRequest::post()
        .uri("/auth/password")
        .cookie(cookie)
        .set_json(json!({ "password": "correct horse battery staple" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let state = returned_auth_state(&settings, &resp);
    assert!(state.session.is_some());
    // the permission is spent once the password has changed
    assert!(!state.recovery);
}

#[actix_web::test]
async fn test_recovery_gate_sees_session_installed_by_concurrent_request() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/user"))
        .and(matchers::bearer_token("at-recovered"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u1",
            "email": "u1@example.com"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let mut settings = settings();
    settings.recovery_gate = gate(20, 100);
    let app = app!(settings.clone(), server.uri());
    let context = context_cookie();

    let waiting = test::TestRequest::post()
        .uri("/auth/callback/resolve")
        .cookie(context.clone())
        .set_json(json!({ "url": "https://shop.example.com/auth/callback?flow=recovery" }))
        .to_request();
    let installing = test::TestRequest::post()
        .uri("/auth/callback/resolve")
        .cookie(context)
        .set_json(json!({
            "url": "https://shop.example.com/auth/callback",
            "fragment": "#access_token=at-recovered&refresh_token=rt-recovered",
        }))
        .to_request();

    let (waited, installed) = tokio::join!(test::call_service(&app, waiting), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        test::call_service(&app, installing).await
    });

    assert_eq!(installed.status(), StatusCode::OK);
    assert_eq!(waited.status(), StatusCode::OK);
    let state = returned_auth_state(&settings, &waited);
    assert_eq!(
        state.session.map(|session| session.access_token).as_deref(),
        Some("at-recovered")
    );
    assert!(state.recovery);

    let body: ResolveResponse = test::read_body_json(waited).await;
    assert_eq!(body.status, "resolved");
    assert_eq!(body.intent, FlowIntent::PasswordRecovery);
    assert_eq!(body.redirect_to, settings.routes.password_change);
}

#[actix_web::test]
async fn test_recovery_with_existing_session_grants_no_password_change() {
    let settings = settings();
    let cookie = auth_cookie(&settings, false);
    let app = app!(settings.clone());

    let req = test::TestRequest::post()
        .uri("/auth/callback/resolve")
        .cookie(cookie)
        .set_json(json!({ "url": "https://shop.example.com/auth/callback?flow=recovery" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(!returned_auth_state(&settings, &resp).recovery);
}

#[actix_web::test]
async fn test_concurrent_guarded_views_do_not_cancel_each_other() {
    let settings = settings();
    let session = auth_cookie(&settings, false);
    let context = context_cookie();
    let entitlements = MockEntitlementSource::returning(Some(TestFixtures::entitlement(Tier::Pro)))
        .then([Err(EntitlementError::Transient("connection reset".to_string()))]);
    let app = app!(settings, UNREACHABLE_PROVIDER, entitlements);

    let reports = test::TestRequest::get()
        .uri("/app/reports")
        .cookie(session.clone())
        .cookie(context.clone())
        .to_request();
    let dashboard = test::TestRequest::get()
        .uri("/app/dashboard")
        .cookie(session)
        .cookie(context)
        .to_request();

    let (reports, dashboard) = tokio::join!(test::call_service(&app, reports), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        test::call_service(&app, dashboard).await
    });

    assert_eq!(reports.status(), StatusCode::OK);
    assert_eq!(dashboard.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_superseded_callback_still_redirects() {
    let mut settings = settings();
    settings.recovery_gate = gate(3, 100);
    let app = app!(settings.clone());
    let context = context_cookie();
    let resolve = || {
        test::TestRequest::post()
            .uri("/auth/callback/resolve")
            .cookie(context.clone())
            .set_json(json!({ "url": "https://shop.example.com/auth/callback?flow=recovery" }))
            .to_request()
    };

    let (first, second) = tokio::join!(test::call_service(&app, resolve()), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        test::call_service(&app, resolve()).await
    });

    assert_eq!(first.status(), StatusCode::CONFLICT);
    let body: ResolveResponse = test::read_body_json(first).await;
    assert_eq!(body.status, "cancelled");
    assert_eq!(body.redirect_to, settings.routes.sign_in);

    let body: ResolveResponse = test::read_body_json(second).await;
    assert_eq!(body.status, "failed");
    assert_eq!(body.error.as_deref(), Some("recovery_timeout"));
}
