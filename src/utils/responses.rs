//! HTTP response helpers
//!
//! Consistent JSON error bodies and redirects for the auth endpoints.

use crate::error::{AuthFlowError, ProviderError};
use actix_web::{cookie::Cookie, http::header, http::StatusCode, HttpResponse};
use serde::Serialize;
use serde_json::json;

pub struct ResponseBuilder;

impl ResponseBuilder {
    /// `302 Found` to `location`, attaching `cookies`
    #[must_use]
    pub fn redirect_with_cookies(location: &str, cookies: Vec<Cookie<'static>>) -> HttpResponse {
        let mut builder = HttpResponse::Found();
        builder.insert_header((header::LOCATION, location));
        for cookie in cookies {
            builder.cookie(cookie);
        }
        builder.finish()
    }

    /// `303 See Other`, used after form posts
    #[must_use]
    pub fn see_other(location: &str, cookies: Vec<Cookie<'static>>) -> HttpResponse {
        let mut builder = HttpResponse::SeeOther();
        builder.insert_header((header::LOCATION, location));
        for cookie in cookies {
            builder.cookie(cookie);
        }
        builder.finish()
    }

    /// `200 OK` JSON body, attaching `cookies`
    #[must_use]
    pub fn json_with_cookies<T: Serialize>(
        body: &T,
        cookies: Vec<Cookie<'static>>,
    ) -> HttpResponse {
        let mut builder = HttpResponse::Ok();
        for cookie in cookies {
            builder.cookie(cookie);
        }
        builder.json(body)
    }

    /// JSON error body `{ "error", "error_description" }`
    #[must_use]
    pub fn error(status: StatusCode, error: &str, description: &str) -> HttpResponse {
        HttpResponse::build(status).json(json!({
            "error": error,
            "error_description": description,
        }))
    }

    #[must_use]
    pub fn missing_field(field_name: &str) -> HttpResponse {
        Self::error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            &format!("Missing required field: {field_name}"),
        )
    }

    /// Map a classified provider failure onto an HTTP error
    #[must_use]
    pub fn from_provider_error(error: &ProviderError) -> HttpResponse {
        match error {
            ProviderError::Rejected(reason) => {
                Self::error(StatusCode::BAD_REQUEST, "rejected", reason)
            }
            ProviderError::NoSession => Self::error(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Authentication is required to access this resource",
            ),
            ProviderError::Unavailable(_) | ProviderError::Transport(_) => Self::error(
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                "The identity provider is temporarily unavailable. Please try again.",
            ),
            ProviderError::Unexpected(_) => Self::error(
                StatusCode::BAD_GATEWAY,
                "bad_gateway",
                "Unexpected response from the identity provider",
            ),
        }
    }

    /// Map a terminal flow error onto an HTTP error
    #[must_use]
    pub fn from_flow_error(error: &AuthFlowError) -> HttpResponse {
        let status = match error {
            AuthFlowError::PropagationTimeout { .. } | AuthFlowError::NoCredentialFound => {
                StatusCode::UNAUTHORIZED
            }
            AuthFlowError::TransientConnectivity { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AuthFlowError::AuthorizationUnavailable { .. } => StatusCode::BAD_GATEWAY,
            AuthFlowError::Cancelled => StatusCode::CONFLICT,
            AuthFlowError::ProviderReported { .. } | AuthFlowError::ExchangeRejected { .. } => {
                StatusCode::BAD_REQUEST
            }
        };
        Self::error(status, error.code(), &error.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_with_cookies() {
        let response =
            ResponseBuilder::redirect_with_cookies("/app/reports", vec![Cookie::new("a", "b")]);
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/app/reports"
        );
        assert_eq!(response.cookies().count(), 1);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            ResponseBuilder::from_provider_error(&ProviderError::Transport("timeout".into()))
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ResponseBuilder::from_flow_error(&AuthFlowError::PropagationTimeout { attempts: 2 })
                .status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ResponseBuilder::from_flow_error(&AuthFlowError::AuthorizationUnavailable {
                reason: "malformed entitlement response".into(),
            })
            .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ResponseBuilder::from_flow_error(&AuthFlowError::Cancelled).status(),
            StatusCode::CONFLICT
        );
    }
}
