use crate::models::HealthResponse;
use crate::settings::AuthgateSettings;
use actix_web::{web, HttpResponse, Result};

const CALLBACK_PAGE: &str = include_str!("../static/callback.html");

/// Health check endpoint
///
/// # Errors
/// Returns an error if health status cannot be determined
pub async fn health() -> Result<HttpResponse> {
    let response = HealthResponse {
        status: "ok".to_string(),
        message: "authgate is running".to_string(),
    };
    Ok(HttpResponse::Ok().json(response))
}

/// Callback page: shows progress and forwards the URL, hash and referrer for resolution
///
/// The page must never be cached; each load carries single-use credentials.
///
/// # Errors
/// Never fails; the signature matches the other handlers.
pub async fn callback_page(settings: web::Data<AuthgateSettings>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .insert_header(("Cache-Control", "no-store"))
        .insert_header(("Referrer-Policy", "strict-origin-when-cross-origin"))
        .body(render_callback_page(&settings)))
}

fn render_callback_page(settings: &AuthgateSettings) -> String {
    let sign_in = serde_json::Value::String(settings.routes.sign_in.clone())
        .to_string()
        .replace("</", "<\\/");
    CALLBACK_PAGE
        .replace("{{SIGN_IN_ROUTE}}", &sign_in)
        .replace(
            "{{FAILURE_DELAY_MS}}",
            &settings.routes.failure_redirect_delay_ms.to_string(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestFixtures;

    #[test]
    fn test_callback_page_falls_back_to_sign_in() {
        let mut settings = TestFixtures::settings();
        settings.routes.sign_in = "/login</script>".to_string();
        let page = render_callback_page(&settings);
        assert!(page.contains(r#"var signInRoute = "/login<\/script>";"#));
        assert!(page.contains("var fallbackDelayMs = 4000;"));
        assert!(!page.contains("{{"));
    }
}
