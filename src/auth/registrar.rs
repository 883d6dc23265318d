//! Reconciliation of externally-asserted identities with local user rows.
//!
//! A registration either matches an existing row (by stable external id, by
//! provider login under anti-recycling rules, or by bare login for directory
//! realm migrations), reactivates a disabled match, or creates a new user.
//! Every branch runs the duplicate-email check first and fails closed.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::AuthError;
use crate::db::{GroupStore, Store, UserStore};
use crate::error::AppResult;
use crate::models::{User, UserRegistration};

/// Provider keys with this prefix are directory realms; their rows may have
/// been created before realm-prefixed provider keys existed.
const DIRECTORY_PROVIDER_PREFIX: &str = "ldap";

/// Public text for duplicate-email conflicts; names no account.
pub const EMAIL_CONFLICT_PUBLIC_MESSAGE: &str = "This account is already associated with another \
     authentication method. Sign in using the current authentication method, or contact your \
     administrator to transfer your account to a different authentication method.";

/// Public text when an externally-managed instance rejects ad-hoc sign-up.
pub const MANAGED_INSTANCE_PUBLIC_MESSAGE: &str =
    "This instance is managed externally. Contact your administrator to get an account.";

/// Creates, updates and reactivates users from identity-provider assertions.
pub struct UserRegistrar {
    store: Arc<dyn Store>,
    managed_instance: bool,
}

impl UserRegistrar {
    pub fn new(store: Arc<dyn Store>, managed_instance: bool) -> Self {
        Self {
            store,
            managed_instance,
        }
    }

    /// Register an asserted identity, returning the local user it now maps to.
    pub async fn register(&self, registration: &UserRegistration) -> AppResult<User> {
        let existing = self.resolve_existing(registration).await?;

        self.check_email_available(registration, existing.as_ref())
            .await?;

        let user = match existing {
            None => self.register_new(registration).await?,
            Some(user) if !user.active => self.reactivate(user, registration).await?,
            Some(user) => self.update_existing(user, registration).await?,
        };

        if registration.identity.should_sync_groups() {
            self.sync_groups(&user, registration).await?;
        }

        Ok(user)
    }

    /// First match wins: external id + provider, then provider login +
    /// provider (anti-recycling validated), then bare login for directory
    /// realm migration.
    async fn resolve_existing(&self, registration: &UserRegistration) -> AppResult<Option<User>> {
        let identity = &registration.identity;
        let provider = &registration.provider;

        if let Some(user) = self
            .store
            .find_by_external_id_and_provider(identity.effective_provider_id(), &provider.key)
            .await?
        {
            return Ok(Some(user));
        }

        // A provider whose assertions always carry a stable id never gets a
        // login-only match: provider logins are recyclable, and matching one
        // would hand the old account to its new holder. The lookup is not
        // even attempted.
        if !provider.strict_identity
            && let Some(user) = self
                .store
                .find_by_external_login_and_provider(identity.provider_login(), &provider.key)
                .await?
        {
            self.validate_login_fallback(registration, &user)?;
            return Ok(Some(user));
        }

        // Directory realms predate realm-prefixed provider keys; their rows
        // are only matchable by bare login. Local accounts are never
        // re-matched this way.
        if provider.key.starts_with(DIRECTORY_PROVIDER_PREFIX)
            && let Some(user) = self.store.find_by_login(identity.provider_login()).await?
            && !user.local
        {
            return Ok(Some(user));
        }

        Ok(None)
    }

    /// A provider-login match skipped the stable external id; decide whether
    /// that is acceptable for this provider.
    fn validate_login_fallback(
        &self,
        registration: &UserRegistration,
        matched: &User,
    ) -> Result<(), AuthError> {
        let identity = &registration.identity;
        let provider = &registration.provider;
        let failure = || {
            AuthError::new(
                registration.source.clone(),
                format!(
                    "Failed to authenticate with login '{}'",
                    identity.provider_login()
                ),
            )
            .with_login(identity.provider_login().to_string())
        };

        if provider.guard_email_recycling
            && let Some(on_record) = matched.email.as_deref()
        {
            let asserted = identity.email().unwrap_or("");
            if !on_record.eq_ignore_ascii_case(asserted) {
                warn!(
                    "User with login '{}' tried to login with email '{}' which doesn't match the email on record '{}'",
                    identity.provider_login(),
                    asserted,
                    on_record
                );
                return Err(failure());
            }
        }

        Ok(())
    }

    /// Fail when the asserted email already belongs to a different active
    /// user. Runs before any write.
    async fn check_email_available(
        &self,
        registration: &UserRegistration,
        matched: Option<&User>,
    ) -> AppResult<()> {
        let Some(email) = registration.identity.email() else {
            return Ok(());
        };

        let owners = self.store.find_active_by_email(email).await?;
        let conflict = owners
            .iter()
            .any(|owner| matched.is_none_or(|m| m.id != owner.id));
        if conflict {
            return Err(AuthError::new(
                registration.source.clone(),
                format!("Email '{email}' is already used"),
            )
            .with_login(registration.identity.provider_login().to_string())
            .with_public_message(EMAIL_CONFLICT_PUBLIC_MESSAGE)
            .into());
        }
        Ok(())
    }

    async fn register_new(&self, registration: &UserRegistration) -> AppResult<User> {
        let identity = &registration.identity;
        let provider = &registration.provider;

        if self.managed_instance {
            if !registration.managed {
                return Err(AuthError::new(
                    registration.source.clone(),
                    format!(
                        "Unmanaged user registration rejected for provider '{}'",
                        provider.key
                    ),
                )
                .with_login(identity.provider_login().to_string())
                .with_public_message(MANAGED_INSTANCE_PUBLIC_MESSAGE)
                .into());
            }
        } else if !provider.allows_signup {
            return Err(AuthError::new(
                registration.source.clone(),
                format!("User signup disabled for provider '{}'", provider.key),
            )
            .with_login(identity.provider_login().to_string())
            .with_public_message(format!(
                "'{}' users are not allowed to sign up",
                provider.key
            ))
            .into());
        }

        let login = self.generate_unique_login(identity.name()).await?;
        debug!(
            "Registering new user '{}' from provider '{}'",
            login, provider.key
        );

        let user = User {
            id: Uuid::new_v4(),
            login,
            name: Some(identity.name().to_string()),
            email: identity.email().map(str::to_string),
            active: true,
            local: false,
            external_identity_provider: Some(provider.key.clone()),
            external_id: Some(identity.effective_provider_id().to_string()),
            external_login: Some(identity.provider_login().to_string()),
            hash_method: None,
            crypted_password: None,
            salt: None,
            reset_password: false,
            created_at: chrono::Utc::now(),
            last_login_at: None,
        };
        let user = self.store.insert_user(user).await?;

        if let Some(default_group) = self.store.default_group_name().await? {
            self.store.add_member(&default_group, user.id).await?;
        }

        Ok(user)
    }

    async fn reactivate(
        &self,
        mut user: User,
        registration: &UserRegistration,
    ) -> AppResult<User> {
        debug!(
            "Reactivating user '{}' from provider '{}'",
            user.login, registration.provider.key
        );
        user.active = true;
        self.apply_profile(&mut user, registration);
        self.store.update_user(&user).await?;
        Ok(user)
    }

    async fn update_existing(
        &self,
        mut user: User,
        registration: &UserRegistration,
    ) -> AppResult<User> {
        self.apply_profile(&mut user, registration);
        self.store.update_user(&user).await?;
        Ok(user)
    }

    /// Overwrite profile and provider-linkage fields from the assertion.
    /// The local login is left alone; only the linkage tracks the provider.
    fn apply_profile(&self, user: &mut User, registration: &UserRegistration) {
        let identity = &registration.identity;
        user.name = Some(identity.name().to_string());
        if let Some(email) = identity.email() {
            user.email = Some(email.to_string());
        }
        user.external_id = Some(identity.effective_provider_id().to_string());
        user.external_login = Some(identity.provider_login().to_string());
        user.external_identity_provider = Some(registration.provider.key.clone());
    }

    /// Slugified name plus a random suffix, retried until free.
    async fn generate_unique_login(&self, name: &str) -> AppResult<String> {
        let slug = slugify(name);
        loop {
            let login = format!("{}{}", slug, rand::random::<u32>() % 100_000);
            if self.store.find_by_login(&login).await?.is_none() {
                return Ok(login);
            }
        }
    }

    /// Align local group membership with the asserted set.
    async fn sync_groups(&self, user: &User, registration: &UserRegistration) -> AppResult<()> {
        let asserted: &BTreeSet<String> = registration
            .identity
            .groups()
            .expect("sync_groups requires an asserted group set");
        let current = self.store.group_names_of_user(user.id).await?;

        for group in asserted.difference(&current) {
            // Groups unknown to this instance are skipped, not created.
            if self.store.group_exists(group).await? {
                self.store.add_member(group, user.id).await?;
            }
        }

        // Providers without push-based removal never remove groups on a
        // managed instance; the default group is never removed at all.
        if self.managed_instance && !registration.provider.supports_group_removal {
            return Ok(());
        }
        let default_group = self.store.default_group_name().await?;
        for group in current.difference(asserted) {
            if default_group.as_deref() == Some(group.as_str()) {
                continue;
            }
            self.store.remove_member(group, user.id).await?;
        }

        Ok(())
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
