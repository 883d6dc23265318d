//! The authentication failure type shared by every authentication method.
//!
//! A failed method raises exactly one `AuthError`; it is converted into an
//! HTTP response (or a browser redirect) once, at the orchestration boundary.
//! The internal message may name accounts and distinguish failure causes; the
//! public message never does.

use std::fmt;

/// How a request attempted to authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `Authorization: Basic` with login and password
    Basic,
    /// `Authorization: Basic` with a user token in the login slot
    BasicToken,
    /// `Authorization: Bearer` user token
    UserToken,
    /// Signed session cookie
    Jwt,
    /// OAuth2 identity-provider callback
    OAuth2,
    /// Reverse-proxy identity headers
    SsoHeaders,
    /// Signed GitHub webhook payload
    GithubWebhook,
    /// Login form posted to the authentication endpoint
    Form,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Basic => "BASIC",
            Method::BasicToken => "BASIC_TOKEN",
            Method::UserToken => "TOKEN",
            Method::Jwt => "JWT",
            Method::OAuth2 => "OAUTH2",
            Method::SsoHeaders => "SSO",
            Method::GithubWebhook => "GITHUB_WEBHOOK",
            Method::Form => "FORM",
        };
        f.write_str(name)
    }
}

/// Where the identity assertion came from: the local credential store, an
/// external identity provider, or the server itself (JWT, SSO headers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    method: Method,
    provider: String,
}

impl Source {
    pub fn local(method: Method) -> Self {
        Self {
            method,
            provider: "local".to_string(),
        }
    }

    pub fn jwt() -> Self {
        Self::local(Method::Jwt)
    }

    pub fn external(provider_key: &str) -> Self {
        Self {
            method: Method::OAuth2,
            provider: provider_key.to_string(),
        }
    }

    pub fn realm(method: Method, realm_name: &str) -> Self {
        Self {
            method,
            provider: realm_name.to_string(),
        }
    }

    pub fn sso() -> Self {
        Self {
            method: Method::SsoHeaders,
            provider: "sso".to_string(),
        }
    }

    pub fn github_webhook() -> Self {
        Self {
            method: Method::GithubWebhook,
            provider: "github".to_string(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.provider, self.method)
    }
}

/// An authentication method applied to the request and rejected it.
///
/// Not to be confused with a method not applying at all - that is `Ok(None)`
/// on the method's authenticate call, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    source: Source,
    login: Option<String>,
    message: String,
    public_message: Option<String>,
}

impl AuthError {
    pub fn new(source: Source, message: impl Into<String>) -> Self {
        Self {
            source,
            login: None,
            message: message.into(),
            public_message: None,
        }
    }

    pub fn with_login(mut self, login: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self
    }

    pub fn with_public_message(mut self, public_message: impl Into<String>) -> Self {
        self.public_message = Some(public_message.into());
        self
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn login(&self) -> Option<&str> {
        self.login.as_deref()
    }

    /// Internal message; for server-side logs only.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Message safe to show to the caller, when one exists.
    pub fn public_message(&self) -> Option<&str> {
        self.public_message.as_deref()
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for AuthError {}
