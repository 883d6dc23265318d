//! User records, external identity assertions, and per-request auth results.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Source;
use crate::error::{AppError, AppResult};

/// A user row as the authentication core sees it.
///
/// The row's lifecycle is owned by the persistence layer; this core mutates
/// the credential and external-identity fields and flips the active flag on
/// reactivation. Never serialized whole - responses use [`UserResponse`],
/// which carries no credential material.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub active: bool,
    /// Credentials are verified locally (password hash on the row).
    pub local: bool,
    pub external_identity_provider: Option<String>,
    pub external_id: Option<String>,
    pub external_login: Option<String>,
    pub hash_method: Option<String>,
    pub crypted_password: Option<String>,
    pub salt: Option<String>,
    /// The user must change their password before doing anything else.
    pub reset_password: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// User info response (returned by the validate endpoint).
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub external_provider: Option<String>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id.to_string(),
            login: u.login,
            name: u.name,
            email: u.email,
            external_provider: u.external_identity_provider,
        }
    }
}

/// Identity asserted by an external provider (OAuth2 callback, SSO headers).
///
/// Built by the provider integration, consumed by the registrar. Immutable;
/// the factory validates the invariants instead of a mutable builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    provider_login: String,
    provider_id: Option<String>,
    name: String,
    email: Option<String>,
    /// `Some` means the provider asserted group membership and wants it
    /// synced; `None` leaves local memberships untouched.
    groups: Option<BTreeSet<String>>,
}

impl UserIdentity {
    pub fn new(provider_login: impl Into<String>, name: impl Into<String>) -> AppResult<Self> {
        let provider_login = provider_login.into();
        let name = name.into();
        if provider_login.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "User identity must have a provider login".to_string(),
            ));
        }
        if name.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "User identity must have a name".to_string(),
            ));
        }
        Ok(Self {
            provider_login,
            provider_id: None,
            name,
            email: None,
            groups: None,
        })
    }

    pub fn with_provider_id(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_groups(mut self, groups: BTreeSet<String>) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn provider_login(&self) -> &str {
        &self.provider_login
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.provider_id.as_deref()
    }

    /// Provider id, falling back to the provider login for providers that
    /// never assert a stable id.
    pub fn effective_provider_id(&self) -> &str {
        self.provider_id.as_deref().unwrap_or(&self.provider_login)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn groups(&self) -> Option<&BTreeSet<String>> {
        self.groups.as_ref()
    }

    pub fn should_sync_groups(&self) -> bool {
        self.groups.is_some()
    }
}

/// Behavioral flags of an identity provider, as the registrar needs them.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub key: String,
    pub name: String,
    /// Unknown users may be created on first login.
    pub allows_signup: bool,
    /// Every assertion carries a stable external id, so matching an existing
    /// row by provider login alone is a recycled-account attack, never a
    /// legitimate migration.
    pub strict_identity: bool,
    /// Provider logins are recyclable; a login match is only trusted when the
    /// asserted email agrees with the one on record.
    pub guard_email_recycling: bool,
    /// The provider pushes group removals; without this, group sync only adds.
    pub supports_group_removal: bool,
}

impl ProviderProfile {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            allows_signup: true,
            strict_identity: false,
            guard_email_recycling: false,
            supports_group_removal: false,
        }
    }
}

/// One external-identity registration request; built per callback, not stored.
#[derive(Debug, Clone)]
pub struct UserRegistration {
    pub identity: UserIdentity,
    pub provider: ProviderProfile,
    pub source: Source,
    /// The assertion came from the external system that manages this
    /// instance's users.
    pub managed: bool,
}

/// How the request ended up authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthType {
    Basic,
    Token,
    Jwt,
    Sso,
}

/// Outcome of one authentication pass over a request. Transient.
#[derive(Debug, Clone)]
pub enum UserAuthResult {
    /// A user record authenticated through one of the methods.
    Authenticated { user: User, auth_type: AuthType },
    /// A signed GitHub webhook call; a pseudo-identity without a user row.
    GithubWebhook,
    /// No authentication method applied. Not an error; route policy decides
    /// whether anonymous access is acceptable.
    Anonymous,
}

impl UserAuthResult {
    pub fn user(&self) -> Option<&User> {
        match self {
            UserAuthResult::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn auth_type(&self) -> Option<AuthType> {
        match self {
            UserAuthResult::Authenticated { auth_type, .. } => Some(*auth_type),
            _ => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, UserAuthResult::Anonymous)
    }
}
