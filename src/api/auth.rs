//! Authentication endpoints: login/logout/validate, OAuth flow, webhook sink.

use actix_web::{HttpRequest, HttpResponse, get, post, web};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::auth::cookies::{auth_error_cookie, request_is_secure};
use crate::auth::oauth::OAuth2Flow;
use crate::auth::password::CredentialsAuthenticator;
use crate::auth::session::SessionManager;
use crate::auth::{Method, RequestAuth, RequestAuthenticator};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::user::UserResponse;
use crate::models::{Credentials, UserAuthResult};

/// Browser landing page after a failed browser-facing flow.
pub const UNAUTHORIZED_PATH: &str = "/sessions/unauthorized";
/// Browser landing page for accounts that must change their password.
pub const CHANGE_PASSWORD_PATH: &str = "/account/change_password";

/// Configure the /api-scoped authentication routes.
pub fn configure_auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(login)
        .service(logout)
        .service(validate)
        .service(github_webhook);
}

/// Configure the root-scoped browser session routes.
pub fn configure_session_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(oauth_init).service(oauth_callback);
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub user: UserResponse,
    /// The UI must send the user to the change-password page first.
    pub requires_password_reset: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
}

/// Authenticate with login/password and open a browser session.
///
/// POST /api/authentication/login
#[utoipa::path(
    post,
    path = "/api/authentication/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session opened", body = LoginResponse),
        (status = 401, description = "Authentication failed")
    )
)]
#[post("/authentication/login")]
pub async fn login(
    req: HttpRequest,
    form: web::Form<LoginRequest>,
    config: web::Data<Config>,
    credentials_auth: web::Data<CredentialsAuthenticator>,
    sessions: web::Data<SessionManager>,
) -> AppResult<HttpResponse> {
    let credentials = Credentials::new(form.login.clone(), Some(form.password.clone()))?;
    let user = credentials_auth
        .authenticate(&credentials, Method::Form)
        .await?;

    let issued = sessions.init_session(&req, &user).await?;

    let requires_password_reset = user.reset_password && config.force_password_reset_redirect;
    let mut response = HttpResponse::Ok();
    for cookie in issued.cookies {
        response.cookie(cookie);
    }
    Ok(response.json(LoginResponse {
        user: user.into(),
        requires_password_reset,
    }))
}

/// Close the session: delete the server-side row, expire both cookies.
///
/// POST /api/authentication/logout
#[utoipa::path(
    post,
    path = "/api/authentication/logout",
    tag = "Authentication",
    responses(
        (status = 204, description = "Session closed")
    )
)]
#[post("/authentication/logout")]
pub async fn logout(
    req: HttpRequest,
    sessions: web::Data<SessionManager>,
) -> AppResult<HttpResponse> {
    let cookies = sessions.revoke(&req).await?;
    let mut response = HttpResponse::NoContent();
    for cookie in cookies {
        response.cookie(cookie);
    }
    Ok(response.finish())
}

/// Report whether the request carries a valid authentication.
///
/// GET /api/authentication/validate
#[utoipa::path(
    get,
    path = "/api/authentication/validate",
    tag = "Authentication",
    responses(
        (status = 200, description = "Validation result", body = ValidateResponse)
    )
)]
#[get("/authentication/validate")]
pub async fn validate(auth: RequestAuth) -> AppResult<HttpResponse> {
    let valid = !auth.result.is_anonymous();
    let mut response = HttpResponse::Ok();
    // A lazy session refresh may have re-signed the cookies.
    for cookie in auth.cookies {
        response.cookie(cookie);
    }
    Ok(response.json(ValidateResponse { valid }))
}

/// Inbound GitHub webhook deliveries; authenticated by payload signature.
///
/// POST /api/github_webhook
#[utoipa::path(
    post,
    path = "/api/github_webhook",
    tag = "Authentication",
    request_body(content = String, description = "Raw GitHub webhook payload", content_type = "application/octet-stream"),
    responses(
        (status = 204, description = "Payload accepted"),
        (status = 401, description = "Signature verification failed")
    )
)]
#[post("/github_webhook")]
pub async fn github_webhook(
    req: HttpRequest,
    body: web::Bytes,
    authenticator: web::Data<RequestAuthenticator>,
) -> AppResult<HttpResponse> {
    let auth = authenticator.authenticate(&req, Some(&body)).await?;
    match auth.result {
        // Delivery handling itself belongs to the platform; this surface
        // only authenticates the call.
        UserAuthResult::GithubWebhook => Ok(HttpResponse::NoContent().finish()),
        _ => Err(AppError::InvalidInput(
            "Not a Github webhook delivery".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct InitQuery {
    pub return_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: Option<String>,
}

/// Start an OAuth2 login with the named provider.
///
/// GET /sessions/init/{provider}
#[get("/sessions/init/{provider}")]
pub async fn oauth_init(
    req: HttpRequest,
    provider: web::Path<String>,
    query: web::Query<InitQuery>,
    flow: web::Data<OAuth2Flow>,
) -> AppResult<HttpResponse> {
    flow.init(&req, &provider, query.return_to.as_deref())
}

/// Handle the provider callback and open a session.
///
/// GET /oauth2/callback/{provider}
#[get("/oauth2/callback/{provider}")]
pub async fn oauth_callback(
    req: HttpRequest,
    provider: web::Path<String>,
    query: web::Query<CallbackQuery>,
    config: web::Data<Config>,
    flow: web::Data<OAuth2Flow>,
) -> AppResult<HttpResponse> {
    match flow
        .callback(&req, &provider, &query.code, query.state.as_deref())
        .await
    {
        Ok(response) => Ok(response),
        // Browser-facing flow: failures become a redirect to the
        // unauthorized page, with the public message in a short-lived cookie.
        Err(AppError::Authentication(err)) => {
            warn!(
                source = %err.source(),
                login = err.login().unwrap_or("-"),
                "{}",
                err
            );
            let secure = request_is_secure(&req);
            let message = err.public_message().unwrap_or("Authentication failed");
            Ok(HttpResponse::Found()
                .cookie(auth_error_cookie(message, config.cookie_path(), secure))
                .append_header((
                    "Location",
                    format!("{}{}", config.context_path, UNAUTHORIZED_PATH),
                ))
                .finish())
        }
        Err(other) => Err(other),
    }
}
