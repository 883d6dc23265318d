//! Login + password resolution against local, external and directory accounts.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::auth::hashing::{CredentialError, CredentialHasher};
use crate::auth::{AuthError, Method, Source};
use crate::db::{Store, UserStore};
use crate::error::{AppError, AppResult};
use crate::models::{Credentials, User};

/// A realm plugged in by the platform (e.g. a SAML/base realm) that can
/// resolve credentials itself. `Ok(None)` means "not my login".
#[async_trait]
pub trait ExternalRealmAuthenticator: Send + Sync {
    async fn authenticate(
        &self,
        credentials: &Credentials,
        method: Method,
    ) -> AppResult<Option<User>>;
}

/// The LDAP directory delegate. `Ok(None)` means the directory does not know
/// this login.
#[async_trait]
pub trait DirectoryAuthenticator: Send + Sync {
    async fn authenticate(
        &self,
        credentials: &Credentials,
        method: Method,
    ) -> AppResult<Option<User>>;
}

/// Resolves a login/password pair to a user.
pub struct CredentialsAuthenticator {
    store: Arc<dyn Store>,
    hasher: Arc<CredentialHasher>,
    external: Option<Arc<dyn ExternalRealmAuthenticator>>,
    directory: Option<Arc<dyn DirectoryAuthenticator>>,
}

impl CredentialsAuthenticator {
    pub fn new(
        store: Arc<dyn Store>,
        hasher: Arc<CredentialHasher>,
        external: Option<Arc<dyn ExternalRealmAuthenticator>>,
        directory: Option<Arc<dyn DirectoryAuthenticator>>,
    ) -> Self {
        Self {
            store,
            hasher,
            external,
            directory,
        }
    }

    /// Authenticate credentials, trying the local account first and the
    /// injected delegates afterwards.
    pub async fn authenticate(
        &self,
        credentials: &Credentials,
        method: Method,
    ) -> AppResult<User> {
        let login = credentials.login();
        let local_user = self
            .store
            .find_by_login(login)
            .await?
            .filter(|u| u.active);

        if let Some(user) = &local_user
            && user.local
        {
            return self.authenticate_local(user, credentials, method).await;
        }

        if let Some(external) = &self.external
            && let Some(user) = external.authenticate(credentials, method).await?
        {
            return Ok(user);
        }

        if let Some(directory) = &self.directory
            && let Some(user) = directory.authenticate(credentials, method).await?
        {
            return Ok(user);
        }

        // Same cost as a real check before failing, so a caller cannot probe
        // which logins exist.
        self.hasher.defend_against_enumeration();
        let message = if local_user.is_some() {
            debug!("Account for login '{}' is not local and no realm accepted it", login);
            format!("Account for login '{login}' is not local")
        } else {
            debug!("No active account found for login '{}'", login);
            format!("No active account found for login '{login}'")
        };
        Err(AuthError::new(Source::local(method), message)
            .with_login(login)
            .into())
    }

    async fn authenticate_local(
        &self,
        user: &User,
        credentials: &Credentials,
        method: Method,
    ) -> AppResult<User> {
        let login = credentials.login();
        // A null password on a local check is a caller bug, not a failed
        // authentication.
        let password = credentials.password().ok_or_else(|| {
            AppError::InvalidInput("Password cannot be null for local authentication".to_string())
        })?;

        let verification = self
            .hasher
            .verify(
                user.hash_method.as_deref(),
                user.crypted_password.as_deref(),
                user.salt.as_deref(),
                password,
            )
            .map_err(|e| {
                // A wrong password already burned a full derivation; the
                // short-circuiting failures have not, so burn one now.
                if e != CredentialError::WrongPassword {
                    self.hasher.defend_against_enumeration();
                }
                AuthError::new(Source::local(method), e.to_string()).with_login(login)
            })?;

        let mut user = user.clone();
        if verification.needs_rehash {
            let upgraded = self.hasher.hash(password);
            user.hash_method = Some(upgraded.method.as_str().to_string());
            user.crypted_password = Some(upgraded.digest);
            user.salt = upgraded.salt;
            self.store.update_user(&user).await?;
        }

        self.store.touch_last_login(user.id).await?;
        Ok(user)
    }
}
