#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use actix_web::{middleware::Logger, web, App, HttpServer};
use authgate::{
    guard::{EntitlementSource, RestEntitlementSource},
    handlers::configure_services,
    provider::GoTrueClient,
    scheduler::FlowRegistry,
    settings::AuthgateSettings,
};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = AuthgateSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    let provider = GoTrueClient::new(&settings.provider).map_err(|e| {
        std::io::Error::other(format!("Failed to initialize identity provider client: {e}"))
    })?;
    let entitlements: Arc<dyn EntitlementSource> = Arc::new(
        RestEntitlementSource::new(&settings.provider).map_err(|e| {
            std::io::Error::other(format!("Failed to initialize entitlement source: {e}"))
        })?,
    );

    println!("✓ Using stateless sessions with encrypted cookies");
    start_server(settings, provider, entitlements).await
}

/// Start the server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(
    settings: AuthgateSettings,
    provider: GoTrueClient,
    entitlements: Arc<dyn EntitlementSource>,
) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, &settings);

    let settings = web::Data::new(settings);
    let provider = web::Data::new(provider);
    let registry = web::Data::new(FlowRegistry::new());
    let entitlements = web::Data::from(entitlements);

    HttpServer::new(move || {
        App::new()
            .app_data(settings.clone())
            .app_data(provider.clone())
            .app_data(registry.clone())
            .app_data(entitlements.clone())
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, settings: &AuthgateSettings) {
    println!("Starting authgate v{} on http://{bind_address}", authgate::VERSION);
    println!("Identity provider: {}", settings.provider.base_url);
    println!();
    println!("Auth endpoints:");
    println!("  GET  /auth/callback          - Callback page (email links, OAuth redirects)");
    println!("  POST /auth/callback/resolve  - Resolve a forwarded callback URL");
    println!("  POST /auth/recover           - Send a password-recovery email");
    println!("  POST /auth/password          - Set a new password");
    println!("  POST /auth/sign_out          - Clear session");
    println!();
    println!("Callback URL to register with the identity provider:");
    println!("  {}", settings.callback_url());
    println!();
    println!("Protected views:");
    for view in &settings.protected_views {
        let tier = view.requires.map_or("any signed-in user", |tier| tier.as_str());
        println!("  GET  /app/{:<20} - {} ({tier})", view.name, view.title);
    }
    println!();
    println!("System endpoints:");
    println!("  GET  /ping                   - Health check");
}
