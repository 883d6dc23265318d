//! The request authenticator: tries every method in fixed precedence order.
//!
//! SSO proxy headers, then the session cookie, then a bearer user token, then
//! a signed webhook payload, then Basic credentials. Each step is skipped
//! cheaply when its trigger (header/cookie) is absent; a request matching no
//! step is anonymous, which is a result, not an error.

use actix_web::cookie::Cookie;
use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{FromRequest, HttpRequest, web};
use futures_util::future::LocalBoxFuture;
use std::sync::Arc;

use crate::auth::password::CredentialsAuthenticator;
use crate::auth::session::SessionManager;
use crate::auth::sso::SsoAuthenticator;
use crate::auth::tokens::UserTokenAuthenticator;
use crate::auth::webhook::GithubWebhookAuthenticator;
use crate::auth::Method;
use crate::error::AppResult;
use crate::models::{AuthType, Credentials, UserAuthResult};

/// Outcome of one authentication pass, plus any cookies a lazy session
/// refresh produced; the response must carry them.
pub struct RequestAuth {
    pub result: UserAuthResult,
    pub cookies: Vec<Cookie<'static>>,
}

impl RequestAuth {
    fn plain(result: UserAuthResult) -> Self {
        Self {
            result,
            cookies: Vec::new(),
        }
    }
}

/// Orchestrates the individual authentication methods.
pub struct RequestAuthenticator {
    sso: Arc<SsoAuthenticator>,
    sessions: Arc<SessionManager>,
    tokens: Arc<UserTokenAuthenticator>,
    webhook: Arc<GithubWebhookAuthenticator>,
    credentials: Arc<CredentialsAuthenticator>,
}

impl RequestAuthenticator {
    pub fn new(
        sso: Arc<SsoAuthenticator>,
        sessions: Arc<SessionManager>,
        tokens: Arc<UserTokenAuthenticator>,
        webhook: Arc<GithubWebhookAuthenticator>,
        credentials: Arc<CredentialsAuthenticator>,
    ) -> Self {
        Self {
            sso,
            sessions,
            tokens,
            webhook,
            credentials,
        }
    }

    /// Authenticate a request. `body` is only needed on routes that accept
    /// webhook deliveries; everywhere else it may be `None`.
    pub async fn authenticate(
        &self,
        req: &HttpRequest,
        body: Option<&[u8]>,
    ) -> AppResult<RequestAuth> {
        if let Some(result) = self.sso.authenticate(req).await? {
            return Ok(RequestAuth::plain(result));
        }

        if let Some(session) = self.sessions.validate(req).await? {
            return Ok(RequestAuth {
                result: UserAuthResult::Authenticated {
                    user: session.user,
                    auth_type: AuthType::Jwt,
                },
                cookies: session.cookies,
            });
        }

        if let Some(token) = bearer_token(req) {
            let user = self.tokens.authenticate(&token, Method::UserToken).await?;
            return Ok(RequestAuth::plain(UserAuthResult::Authenticated {
                user,
                auth_type: AuthType::Token,
            }));
        }

        if let Some(result) = self.webhook.authenticate(req, body).await? {
            return Ok(RequestAuth::plain(result));
        }

        if let Some(header_value) = authorization_header(req)
            && header_value.starts_with("Basic ")
        {
            let credentials = Credentials::from_basic_header(&header_value)?;
            // An empty password slot means the login slot carries a token.
            let result = if credentials.has_password() {
                let user = self
                    .credentials
                    .authenticate(&credentials, Method::Basic)
                    .await?;
                UserAuthResult::Authenticated {
                    user,
                    auth_type: AuthType::Basic,
                }
            } else {
                let user = self
                    .tokens
                    .authenticate(credentials.login(), Method::BasicToken)
                    .await?;
                UserAuthResult::Authenticated {
                    user,
                    auth_type: AuthType::Token,
                }
            };
            return Ok(RequestAuth::plain(result));
        }

        Ok(RequestAuth::plain(UserAuthResult::Anonymous))
    }
}

fn authorization_header(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .map(str::to_string)
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let value = authorization_header(req)?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

impl FromRequest for RequestAuth {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let authenticator = req
                .app_data::<web::Data<RequestAuthenticator>>()
                .ok_or_else(|| {
                    actix_web::error::ErrorInternalServerError(
                        "request authenticator not configured",
                    )
                })?
                .clone();
            // Body-bound methods (webhooks) authenticate in their own
            // handler; the generic extractor never consumes the payload.
            let auth = authenticator.authenticate(&req, None).await?;
            Ok(auth)
        })
    }
}
