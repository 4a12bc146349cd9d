// HTTP request handlers for the auth endpoints
pub mod auth;
pub mod callback;
pub mod guarded;
pub mod static_files;

#[cfg(test)]
mod tests;

use actix_web::web;

// Re-export the main handler functions
pub use auth::{request_recovery, sign_out, update_password};
pub use callback::{resolve_callback, ResolveResponse};
pub use guarded::protected_view;
pub use static_files::{callback_page, health};

/// Register every route served by authgate
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg.route("/ping", web::get().to(health))
        .route("/auth/callback", web::get().to(callback_page))
        .route("/auth/callback/resolve", web::post().to(resolve_callback))
        .route("/auth/recover", web::post().to(request_recovery))
        .route("/auth/password", web::post().to(update_password))
        .route("/auth/sign_out", web::post().to(sign_out))
        .route("/app/{view}", web::get().to(protected_view));
}
