//! Route guard tests against scripted session and entitlement sources

use authgate::error::AuthFlowError;
use authgate::guard::{EntitlementError, GuardDecision, GuardRequirements, NoProgress, RouteGuard};
use authgate::models::{EntitlementRecord, SessionEvent, Tier};
use authgate::provider::IdentityProvider;
use authgate::scheduler::{FlowRegistry, Pacer};
use authgate::settings::RouteSettings;
use authgate::testing::{
    MockEntitlementSource, MockIdentityProvider, RecordingProgress, TestFixtures,
};
use std::time::Duration;

fn requirements(path: &str, min_tier: Option<Tier>) -> GuardRequirements {
    GuardRequirements {
        return_to: path.to_string(),
        min_tier,
    }
}

fn transient() -> EntitlementError {
    EntitlementError::Transient("connection reset".to_string())
}

#[tokio::test(start_paused = true)]
async fn test_scenario_e_insufficient_tier_redirects_to_upgrade() {
    let provider = MockIdentityProvider::new().with_session(TestFixtures::session());
    let entitlements =
        MockEntitlementSource::returning(Some(TestFixtures::entitlement(Tier::Free)));
    let routes = RouteSettings::default();

    let decision = RouteGuard::new(&provider, &entitlements, &routes)
        .check(
            &requirements("/app/audit", Some(Tier::Enterprise)),
            &Pacer::default(),
            &NoProgress,
        )
        .await
        .unwrap();

    assert_eq!(
        decision,
        GuardDecision::RedirectToUpgrade {
            location: "/pricing?required=enterprise".to_string(),
            required: Tier::Enterprise,
            current: Tier::Free,
        }
    );
    assert_eq!(entitlements.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_session_redirects_with_return_location() {
    let provider = MockIdentityProvider::new();
    let entitlements = MockEntitlementSource::returning(None);
    let routes = RouteSettings::default();

    let decision = RouteGuard::new(&provider, &entitlements, &routes)
        .check(
            &requirements("/app/reports?tab=weekly", Some(Tier::Pro)),
            &Pacer::default(),
            &NoProgress,
        )
        .await
        .unwrap();

    assert_eq!(
        decision,
        GuardDecision::RedirectToSignIn {
            location: "/auth/sign_in?return_to=%2Fapp%2Freports%3Ftab%3Dweekly".to_string(),
        }
    );
    assert_eq!(entitlements.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unsafe_return_location_falls_back_to_app_root() {
    let provider = MockIdentityProvider::new();
    let entitlements = MockEntitlementSource::returning(None);
    let routes = RouteSettings::default();

    let decision = RouteGuard::new(&provider, &entitlements, &routes)
        .check(&requirements("//evil.example", None), &Pacer::default(), &NoProgress)
        .await
        .unwrap();

    assert_eq!(
        decision,
        GuardDecision::RedirectToSignIn {
            location: "/auth/sign_in?return_to=%2F".to_string(),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_back_off_then_render() {
    let provider = MockIdentityProvider::new().with_session(TestFixtures::session());
    let entitlements = MockEntitlementSource::returning(Some(TestFixtures::entitlement(Tier::Pro)))
        .then([Err(transient()), Err(transient())]);
    let routes = RouteSettings::default();
    let progress = RecordingProgress::default();

    let decision = RouteGuard::new(&provider, &entitlements, &routes)
        .check(&requirements("/app/reports", Some(Tier::Pro)), &Pacer::default(), &progress)
        .await
        .unwrap();

    assert!(matches!(
        decision,
        GuardDecision::Render {
            tier: Some(Tier::Pro),
            ..
        }
    ));
    assert_eq!(
        progress.retries(),
        vec![
            (1, Duration::from_millis(500)),
            (2, Duration::from_millis(1000)),
        ]
    );
    assert_eq!(entitlements.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_exhaustion_is_unavailable() {
    let provider = MockIdentityProvider::new().with_session(TestFixtures::session());
    let entitlements = MockEntitlementSource::failing(transient());
    let routes = RouteSettings::default();
    let progress = RecordingProgress::default();

    let decision = RouteGuard::new(&provider, &entitlements, &routes)
        .check(&requirements("/app/reports", Some(Tier::Pro)), &Pacer::default(), &progress)
        .await
        .unwrap();

    let GuardDecision::Unavailable { error } = decision else {
        panic!("expected Unavailable, got {decision:?}");
    };
    assert!(matches!(
        error,
        AuthFlowError::TransientConnectivity { attempts: 5, .. }
    ));
    // capped exponential: 500, 1000, 2000, 4000
    let delays: Vec<_> = progress.retries().into_iter().map(|(_, delay)| delay).collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(500),
            Duration::from_millis(1000),
            Duration::from_millis(2000),
            Duration::from_millis(4000),
        ]
    );
    assert_eq!(entitlements.calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_lookup_failure_is_not_retried() {
    let provider = MockIdentityProvider::new().with_session(TestFixtures::session());
    let entitlements =
        MockEntitlementSource::failing(EntitlementError::Fatal("malformed response".to_string()));
    let routes = RouteSettings::default();
    let progress = RecordingProgress::default();

    let decision = RouteGuard::new(&provider, &entitlements, &routes)
        .check(&requirements("/app/reports", Some(Tier::Pro)), &Pacer::default(), &progress)
        .await
        .unwrap();

    let GuardDecision::Unavailable { error } = decision else {
        panic!("expected Unavailable, got {decision:?}");
    };
    assert_eq!(error.code(), "authorization_unavailable");
    assert!(!error.user_message().contains("reach the server"));
    assert!(progress.retries().is_empty());
    assert_eq!(entitlements.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_absent_record_is_lowest_tier() {
    let provider = MockIdentityProvider::new().with_session(TestFixtures::session());
    let entitlements = MockEntitlementSource::returning(None);
    let routes = RouteSettings::default();
    let guard = RouteGuard::new(&provider, &entitlements, &routes);

    let decision = guard
        .check(&requirements("/app/basics", Some(Tier::Free)), &Pacer::default(), &NoProgress)
        .await
        .unwrap();
    assert!(matches!(
        decision,
        GuardDecision::Render {
            tier: Some(Tier::Free),
            ..
        }
    ));

    let decision = guard
        .check(&requirements("/app/reports", Some(Tier::Pro)), &Pacer::default(), &NoProgress)
        .await
        .unwrap();
    assert!(matches!(
        decision,
        GuardDecision::RedirectToUpgrade {
            current: Tier::Free,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_inactive_subscription_grants_lowest_tier() {
    let provider = MockIdentityProvider::new().with_session(TestFixtures::session());
    let entitlements = MockEntitlementSource::returning(Some(EntitlementRecord {
        tier: Tier::Enterprise,
        status: "canceled".to_string(),
    }));
    let routes = RouteSettings::default();

    let decision = RouteGuard::new(&provider, &entitlements, &routes)
        .check(&requirements("/app/reports", Some(Tier::Pro)), &Pacer::default(), &NoProgress)
        .await
        .unwrap();

    assert!(matches!(
        decision,
        GuardDecision::RedirectToUpgrade {
            current: Tier::Free,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_view_without_tier_skips_lookup() {
    let provider = MockIdentityProvider::new().with_session(TestFixtures::session());
    let entitlements = MockEntitlementSource::failing(transient());
    let routes = RouteSettings::default();

    let decision = RouteGuard::new(&provider, &entitlements, &routes)
        .check(&requirements("/app/dashboard", None), &Pacer::default(), &NoProgress)
        .await
        .unwrap();

    assert!(matches!(decision, GuardDecision::Render { tier: None, .. }));
    assert_eq!(entitlements.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_during_backoff() {
    let provider = MockIdentityProvider::new().with_session(TestFixtures::session());
    let entitlements = MockEntitlementSource::failing(transient());
    let routes = RouteSettings::default();
    let registry = FlowRegistry::new();
    let pacer = registry.begin("browser-1", "guard");

    let guard = RouteGuard::new(&provider, &entitlements, &routes);
    let reqs = requirements("/app/reports", Some(Tier::Pro));
    let check = guard.check(&reqs, &pacer, &NoProgress);
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        registry.cancel("browser-1");
    };
    let (result, ()) = tokio::join!(check, cancel);

    assert_eq!(result, Err(AuthFlowError::Cancelled));
    assert_eq!(entitlements.calls(), 1);
}

#[tokio::test]
async fn test_watch_session_redirects_on_sign_out() {
    let provider = MockIdentityProvider::new().with_session(TestFixtures::session());
    let entitlements = MockEntitlementSource::returning(None);
    let routes = RouteSettings::default();
    let guard = RouteGuard::new(&provider, &entitlements, &routes);
    let pacer = Pacer::default();
    let mut events = provider.subscribe();

    provider.emit(SessionEvent::UserUpdated(TestFixtures::session()));
    provider.sign_out().await.unwrap();

    let decision = guard
        .watch_session(&mut events, "/app/reports", &pacer)
        .await
        .unwrap();
    assert_eq!(
        decision,
        GuardDecision::RedirectToSignIn {
            location: "/auth/sign_in?return_to=%2Fapp%2Freports".to_string(),
        }
    );
}
