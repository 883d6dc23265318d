//! OAuth2 identity providers: registry, CSRF-guarded flow, GitHub provider.
//!
//! The flow: `/sessions/init/{provider}` plants a random state cookie and
//! redirects to the provider; the callback verifies the state, exchanges the
//! code, maps the asserted profile through the registrar and opens a session.

use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::auth::registrar::UserRegistrar;
use crate::auth::session::SessionManager;
use crate::auth::{AuthError, Source, cookies};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{ProviderProfile, UserIdentity, UserRegistration};

/// OAuth CSRF state cookie, verified on callback to prevent login CSRF.
const OAUTH_STATE_COOKIE: &str = "VERDICT_OAUTH_STATE";
/// Where to land after a successful callback, when the init requested it.
const RETURN_TO_COOKIE: &str = "VERDICT_RETURN_TO";
/// The whole init -> callback round trip must fit in this window.
const OAUTH_FLOW_TTL_SECS: i64 = 5 * 60;

/// HTTP connect timeout for provider API calls.
const HTTP_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
/// HTTP total timeout for provider API calls.
const HTTP_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// One pluggable OAuth2 identity provider.
#[async_trait]
pub trait OAuthIdentityProvider: Send + Sync {
    fn profile(&self) -> &ProviderProfile;
    fn enabled(&self) -> bool;
    /// The provider authorization URL the browser is sent to.
    fn authorization_url(&self, state: &str) -> String;
    /// Exchange the callback code for an asserted identity.
    async fn callback(&self, code: &str) -> AppResult<UserIdentity>;
}

/// Provider lookup table; populated at startup, read-only afterwards.
#[derive(Default)]
pub struct IdentityProviderRegistry {
    providers: HashMap<String, Arc<dyn OAuthIdentityProvider>>,
}

impl IdentityProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn OAuthIdentityProvider>>) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|p| (p.profile().key.clone(), p))
                .collect(),
        }
    }

    /// Resolve an enabled provider or fail.
    pub fn get(&self, key: &str) -> AppResult<Arc<dyn OAuthIdentityProvider>> {
        self.providers
            .get(key)
            .filter(|p| p.enabled())
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("Identity provider '{key}'"))
            })
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .providers
            .values()
            .filter(|p| p.enabled())
            .map(|p| p.profile().key.clone())
            .collect();
        keys.sort();
        keys
    }
}

/// Drives init -> redirect -> callback -> session establishment.
pub struct OAuth2Flow {
    registry: Arc<IdentityProviderRegistry>,
    registrar: Arc<UserRegistrar>,
    sessions: Arc<SessionManager>,
    context_path: String,
}

impl OAuth2Flow {
    pub fn new(
        registry: Arc<IdentityProviderRegistry>,
        registrar: Arc<UserRegistrar>,
        sessions: Arc<SessionManager>,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            registrar,
            sessions,
            context_path: config.context_path.clone(),
        }
    }

    /// Start the flow: plant the state cookie and redirect to the provider.
    pub fn init(
        &self,
        req: &HttpRequest,
        provider_key: &str,
        return_to: Option<&str>,
    ) -> AppResult<HttpResponse> {
        let provider = self.registry.get(provider_key)?;
        let state = hex::encode(rand::random::<[u8; 16]>());
        let secure = cookies::request_is_secure(req);

        let mut response = HttpResponse::Found();
        response.cookie(flow_cookie(OAUTH_STATE_COOKIE, state.clone(), secure));
        if let Some(target) = return_to.and_then(|r| self.sanitize_return_to(r)) {
            response.cookie(flow_cookie(RETURN_TO_COOKIE, target, secure));
        }

        Ok(response
            .append_header(("Location", provider.authorization_url(&state)))
            .finish())
    }

    /// Finish the flow: verify state, exchange the code, register the
    /// identity and open a session.
    pub async fn callback(
        &self,
        req: &HttpRequest,
        provider_key: &str,
        code: &str,
        state: Option<&str>,
    ) -> AppResult<HttpResponse> {
        let provider = self.registry.get(provider_key)?;
        let source = Source::external(provider_key);

        let expected_state = req
            .cookie(OAUTH_STATE_COOKIE)
            .map(|c| c.value().to_string())
            .unwrap_or_default();
        let provided_state = state.unwrap_or_default();
        if expected_state.is_empty()
            || provided_state.is_empty()
            || expected_state != provided_state
        {
            warn!("OAuth callback for '{}': state mismatch", provider_key);
            return Err(AuthError::new(source, "OAuth state verification failed")
                .with_public_message("Authentication failed")
                .into());
        }

        let identity = provider.callback(code).await?;
        let registration = UserRegistration {
            identity,
            provider: provider.profile().clone(),
            source,
            // OAuth sign-ins are never the managing system's own assertions;
            // on a managed instance unknown users fail closed in the
            // registrar.
            managed: false,
        };
        let user = self.registrar.register(&registration).await?;
        tracing::info!(
            "OAuth login: user='{}' via provider '{}'",
            user.login,
            provider_key
        );

        let issued = self.sessions.init_session(req, &user).await?;
        let secure = cookies::request_is_secure(req);

        let location = req
            .cookie(RETURN_TO_COOKIE)
            .map(|c| c.value().to_string())
            .and_then(|target| self.sanitize_return_to(&target))
            .unwrap_or_else(|| self.landing_path());

        let mut response = HttpResponse::Found();
        for cookie in issued.cookies {
            response.cookie(cookie);
        }
        response.cookie(clear_flow_cookie(OAUTH_STATE_COOKIE, secure));
        response.cookie(clear_flow_cookie(RETURN_TO_COOKIE, secure));

        Ok(response.append_header(("Location", location)).finish())
    }

    fn landing_path(&self) -> String {
        if self.context_path.is_empty() {
            "/".to_string()
        } else {
            format!("{}/", self.context_path)
        }
    }

    /// Only context-relative targets survive; everything else falls back to
    /// the landing page so the callback can never become an open redirect.
    fn sanitize_return_to(&self, target: &str) -> Option<String> {
        let target = target.trim();
        if !target.starts_with('/') || target.starts_with("//") || target.contains("://") {
            return None;
        }
        if self.context_path.is_empty() || target.starts_with(&self.context_path) {
            Some(target.to_string())
        } else {
            None
        }
    }
}

fn flow_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(secure);
    cookie.set_max_age(CookieDuration::seconds(OAUTH_FLOW_TTL_SECS));
    cookie
}

fn clear_flow_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, "");
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(secure);
    cookie.set_max_age(CookieDuration::ZERO);
    cookie
}

// ============================================================================
// GitHub provider
// ============================================================================

/// GitHub OAuth2 provider.
pub struct GitHubProvider {
    profile: ProviderProfile,
    enabled: bool,
    client_id: String,
    client_secret: Option<SecretString>,
    redirect_url: String,
}

impl GitHubProvider {
    pub fn from_config(config: &Config) -> Self {
        let settings = &config.github_oauth;
        let mut profile = ProviderProfile::new("github", "GitHub");
        profile.allows_signup = settings.allow_signup;
        // GitHub logins are recyclable; the email guard closes the window.
        profile.guard_email_recycling = true;

        Self {
            profile,
            enabled: settings.enabled,
            client_id: settings.client_id.clone().unwrap_or_default(),
            client_secret: settings.client_secret.clone(),
            redirect_url: settings
                .redirect_url
                .clone()
                .unwrap_or_else(|| format!("{}/oauth2/callback/github", config.context_path)),
        }
    }

    fn http_client() -> reqwest::Client {
        reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client for OAuth")
    }

    fn exchange_error(&self, detail: impl std::fmt::Display) -> AppError {
        warn!("GitHub OAuth exchange failed: {}", detail);
        AuthError::new(
            Source::external(&self.profile.key),
            format!("GitHub authentication failed: {detail}"),
        )
        .with_public_message("GitHub authentication failed")
        .into()
    }
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

#[derive(serde::Deserialize)]
struct GitHubUserInfo {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[async_trait]
impl OAuthIdentityProvider for GitHubProvider {
    fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn authorization_url(&self, state: &str) -> String {
        format!(
            "https://github.com/login/oauth/authorize?client_id={}&redirect_uri={}&state={}&scope=user:email",
            self.client_id,
            urlencoding::encode(&self.redirect_url),
            urlencoding::encode(state),
        )
    }

    async fn callback(&self, code: &str) -> AppResult<UserIdentity> {
        let client_secret = self
            .client_secret
            .as_ref()
            .ok_or_else(|| self.exchange_error("client secret not configured"))?;

        let http_client = Self::http_client();
        let token_response: TokenResponse = http_client
            .post("https://github.com/login/oauth/access_token")
            .header("Accept", "application/json")
            .json(&serde_json::json!({
                "client_id": self.client_id,
                "client_secret": client_secret.expose_secret(),
                "code": code,
            }))
            .send()
            .await
            .map_err(|e| self.exchange_error(e))?
            .json()
            .await
            .map_err(|e| self.exchange_error(e))?;

        if let Some(error) = token_response.error {
            return Err(self.exchange_error(error));
        }
        let access_token: SecretString = token_response
            .access_token
            .map(SecretString::from)
            .ok_or_else(|| self.exchange_error("no access_token in response"))?;

        let user_info: GitHubUserInfo = http_client
            .get("https://api.github.com/user")
            .header(
                "Authorization",
                format!("Bearer {}", access_token.expose_secret()),
            )
            .header("User-Agent", "verdict-auth")
            .send()
            .await
            .map_err(|e| self.exchange_error(e))?
            .json()
            .await
            .map_err(|e| self.exchange_error(e))?;

        let name = user_info.name.unwrap_or_else(|| user_info.login.clone());
        let mut identity = UserIdentity::new(user_info.login, name)?
            .with_provider_id(user_info.id.to_string());
        if let Some(email) = user_info.email {
            identity = identity.with_email(email);
        }
        Ok(identity)
    }
}
