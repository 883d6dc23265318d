//! Login/password pair extracted from a request.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};

use crate::auth::{AuthError, Method, Source};

/// An immutable login/password pair.
///
/// An empty password is normalized to "absent" at construction time; no
/// `Credentials` value ever holds an empty-string password.
#[derive(Clone)]
pub struct Credentials {
    login: String,
    password: Option<SecretString>,
}

impl Credentials {
    /// Build credentials, trimming the empty password to `None`.
    ///
    /// Fails when the login is blank.
    pub fn new(login: impl Into<String>, password: Option<String>) -> Result<Self, AuthError> {
        let login = login.into();
        if login.is_empty() {
            return Err(AuthError::new(
                Source::local(Method::Basic),
                "Empty login in credentials",
            ));
        }
        let password = password.filter(|p| !p.is_empty()).map(SecretString::from);
        Ok(Self { login, password })
    }

    /// Parse an `Authorization: Basic <base64(login:password)>` header value.
    ///
    /// The password part may itself contain ':'; only the first colon splits.
    pub fn from_basic_header(header_value: &str) -> Result<Self, AuthError> {
        let source = Source::local(Method::Basic);
        let encoded = header_value
            .strip_prefix("Basic ")
            .ok_or_else(|| AuthError::new(source.clone(), "Missing Basic prefix in header"))?;

        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| AuthError::new(source.clone(), "Invalid basic header"))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| AuthError::new(source.clone(), "Invalid basic header"))?;

        let (login, password) = decoded
            .split_once(':')
            .ok_or_else(|| AuthError::new(source.clone(), "Invalid basic header"))?;

        Self::new(login, Some(password.to_string()))
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|p| p.expose_secret())
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field(
                "password",
                &self.password.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}
