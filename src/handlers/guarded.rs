// Protected views behind the route guard
use crate::guard::{EntitlementSource, GuardDecision, GuardRequirements, NoProgress, RouteGuard};
use crate::provider::GoTrueClient;
use crate::scheduler::FlowRegistry;
use crate::settings::AuthgateSettings;
use crate::utils::cookie_utils::AuthCookies;
use crate::utils::logging::LoggingHelper;
use crate::utils::responses::ResponseBuilder;
use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Result};
use uuid::Uuid;

/// Serve a configured protected view
///
/// # Errors
///
/// Never fails; every guard decision maps to a response.
pub async fn protected_view(
    req: HttpRequest,
    view: web::Path<String>,
    settings: web::Data<AuthgateSettings>,
    provider: web::Data<GoTrueClient>,
    entitlements: web::Data<dyn EntitlementSource>,
    registry: web::Data<FlowRegistry>,
) -> Result<HttpResponse> {
    let Some(view) = settings.get_protected_view(&view) else {
        return Ok(ResponseBuilder::error(
            StatusCode::NOT_FOUND,
            "not_found",
            "No such view",
        ));
    };

    let cookies = AuthCookies::from_settings(&settings);
    let (context, _) = cookies.flow_context(&req);
    let browser_provider = provider.for_context(&context, cookies.read_auth_state(&req));
    let requirements = GuardRequirements {
        return_to: req
            .uri()
            .path_and_query()
            .map_or_else(|| req.path().to_string(), ToString::to_string),
        min_tier: view.requires,
    };

    let guard = RouteGuard::new(&browser_provider, entitlements.get_ref(), &settings.routes)
        .with_retry(settings.route_guard);
    // Each page load is its own flow; only sign-out cancels it
    let slot = format!("guard:{}", Uuid::new_v4());
    let pacer = registry.begin(&context, &slot);
    let decision = guard.check(&requirements, &pacer, &NoProgress).await;
    registry.finish(&context, &slot, &pacer);

    let decision = decision.unwrap_or_else(|_| {
        LoggingHelper::log_flow_cancelled(&context, &slot);
        guard.sign_in_redirect(&requirements.return_to)
    });

    Ok(match decision {
        GuardDecision::Render { session, tier } => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(render_view(
                &view.title,
                session.display_identity(),
                tier.map(|tier| tier.as_str()),
            )),
        GuardDecision::RedirectToSignIn { location }
        | GuardDecision::RedirectToUpgrade { location, .. } => {
            ResponseBuilder::redirect_with_cookies(&location, Vec::new())
        }
        GuardDecision::Unavailable { error } => HttpResponse::ServiceUnavailable()
            .content_type("text/html; charset=utf-8")
            .body(render_unavailable(&error.user_message())),
    })
}

fn render_view(title: &str, identity: &str, tier: Option<&str>) -> String {
    let tier_line = tier.map_or_else(String::new, |tier| {
        format!("<p class=\"tier\">Plan: {}</p>", escape_html(tier))
    });
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
</head>
<body>
    <h1>{title}</h1>
    <p>Signed in as {identity}</p>
    {tier_line}
    <form method="post" action="/auth/sign_out"><button type="submit">Sign out</button></form>
</body>
</html>"#,
        title = escape_html(title),
        identity = escape_html(identity),
    )
}

fn render_unavailable(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Temporarily unavailable</title>
</head>
<body>
    <p>{}</p>
    <button type="button" onclick="window.location.reload()">Reload</button>
</body>
</html>"#,
        escape_html(message)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_escapes_identity() {
        let html = render_view("Reports", "<script>@example.com", Some("pro"));
        assert!(html.contains("&lt;script&gt;@example.com"));
        assert!(html.contains("Plan: pro"));
    }

    #[test]
    fn test_unavailable_page_offers_reload() {
        let html = render_unavailable("We could not reach the server.");
        assert!(html.contains("window.location.reload()"));
    }
}
