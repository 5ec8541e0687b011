#![allow(clippy::needless_for_each)]

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::handlers::{health, password, session, types, verification};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        session::login,
        session::refresh,
        session::logout,
        verification::request_verification,
        verification::verify_email,
        password::request_reset,
        password::check_reset,
        password::confirm_reset,
    ),
    components(
        schemas(
            health::Health,
            types::LoginRequest,
            types::SessionResponse,
            types::RefreshRequest,
            types::VerifyEmailRequest,
            types::PasswordResetRequest,
            types::PasswordResetCheckRequest,
            types::PasswordResetConfirmRequest,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Service status"),
        (name = "auth", description = "Sessions, email verification and password reset"),
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_auth_route() {
        let doc = openapi();
        for path in [
            "/health",
            "/v1/auth/login",
            "/v1/auth/refresh",
            "/v1/auth/logout",
            "/v1/auth/verify-email/request",
            "/v1/auth/verify-email",
            "/v1/auth/password-reset/request",
            "/v1/auth/password-reset/check",
            "/v1/auth/password-reset",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        assert_eq!(doc.info.title, "noteauth");
    }
}
