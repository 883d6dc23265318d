//! Integration tests for the authentication endpoints, running the real
//! actix application against the in-memory store backend.

macro_rules! test_app {
    ($ctx:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data($ctx.config.clone())
                .app_data($ctx.authenticator.clone())
                .app_data($ctx.sessions.clone())
                .app_data($ctx.credentials.clone())
                .app_data($ctx.oauth.clone())
                .service(
                    actix_web::web::scope("/api")
                        .configure(verdict_auth::api::configure_health_routes)
                        .configure(verdict_auth::api::configure_auth_routes),
                )
                .configure(verdict_auth::api::configure_session_routes),
        )
    };
}

mod helpers;
mod login_tests;
mod sso_tests;
mod webhook_tests;
