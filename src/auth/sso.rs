//! Reverse-proxy header authentication.
//!
//! When the instance sits behind a trusted SSO proxy, the proxy asserts the
//! identity through forwarded headers. The assertion is run through the
//! registrar on every request so profile and group changes propagate.

use actix_web::HttpRequest;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::auth::registrar::UserRegistrar;
use crate::auth::Source;
use crate::error::AppResult;
use crate::models::{AuthType, ProviderProfile, UserAuthResult, UserIdentity, UserRegistration};

pub const SSO_LOGIN_HEADER: &str = "x-forwarded-login";
pub const SSO_NAME_HEADER: &str = "x-forwarded-name";
pub const SSO_EMAIL_HEADER: &str = "x-forwarded-email";
pub const SSO_GROUPS_HEADER: &str = "x-forwarded-groups";

/// Provider key recorded on rows provisioned through the proxy.
pub const SSO_PROVIDER_KEY: &str = "sso";

pub struct SsoAuthenticator {
    registrar: Arc<UserRegistrar>,
    enabled: bool,
}

impl SsoAuthenticator {
    pub fn new(registrar: Arc<UserRegistrar>, enabled: bool) -> Self {
        Self { registrar, enabled }
    }

    /// Authenticate from proxy headers; `Ok(None)` when disabled or when the
    /// login header is absent.
    pub async fn authenticate(&self, req: &HttpRequest) -> AppResult<Option<UserAuthResult>> {
        if !self.enabled {
            return Ok(None);
        }
        let Some(login) = header(req, SSO_LOGIN_HEADER) else {
            return Ok(None);
        };

        let name = header(req, SSO_NAME_HEADER).unwrap_or_else(|| login.clone());
        let mut identity = UserIdentity::new(login, name)?;
        if let Some(email) = header(req, SSO_EMAIL_HEADER) {
            identity = identity.with_email(email);
        }
        if let Some(groups) = header(req, SSO_GROUPS_HEADER) {
            let groups: BTreeSet<String> = groups
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect();
            identity = identity.with_groups(groups);
        }

        let mut provider = ProviderProfile::new(SSO_PROVIDER_KEY, "SSO");
        // The proxy re-asserts the full group list on every request, so
        // removals are authoritative.
        provider.supports_group_removal = true;

        let registration = UserRegistration {
            identity,
            provider,
            source: Source::sso(),
            // The proxy is the identity system this instance trusts.
            managed: true,
        };

        let user = self.registrar.register(&registration).await?;
        Ok(Some(UserAuthResult::Authenticated {
            user,
            auth_type: AuthType::Sso,
        }))
    }
}

fn header(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GroupStore;
    use crate::db::memory::MemoryStore;
    use actix_web::test::TestRequest;

    fn authenticator(enabled: bool) -> (Arc<MemoryStore>, SsoAuthenticator) {
        let store = Arc::new(MemoryStore::new());
        store.add_group("verdict-users", true);
        store.add_group("auditors", false);
        let registrar = Arc::new(UserRegistrar::new(store.clone(), false));
        (store, SsoAuthenticator::new(registrar, enabled))
    }

    #[tokio::test]
    async fn disabled_authenticator_never_applies() {
        let (_, auth) = authenticator(false);
        let req = TestRequest::get()
            .uri("/")
            .insert_header((SSO_LOGIN_HEADER, "jdoe"))
            .to_http_request();
        assert!(auth.authenticate(&req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn absent_login_header_does_not_apply() {
        let (_, auth) = authenticator(true);
        let req = TestRequest::get().uri("/").to_http_request();
        assert!(auth.authenticate(&req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn headers_provision_a_user_with_groups() {
        let (store, auth) = authenticator(true);
        let req = TestRequest::get()
            .uri("/")
            .insert_header((SSO_LOGIN_HEADER, "jdoe"))
            .insert_header((SSO_NAME_HEADER, "Jane Doe"))
            .insert_header((SSO_EMAIL_HEADER, "jane@example.com"))
            .insert_header((SSO_GROUPS_HEADER, "auditors, unknown-group"))
            .to_http_request();

        let result = auth.authenticate(&req).await.unwrap().unwrap();
        let user = result.user().unwrap();
        assert_eq!(result.auth_type(), Some(AuthType::Sso));
        assert_eq!(user.external_login.as_deref(), Some("jdoe"));
        assert_eq!(user.email.as_deref(), Some("jane@example.com"));
        assert_eq!(
            user.external_identity_provider.as_deref(),
            Some(SSO_PROVIDER_KEY)
        );

        let groups = store.group_names_of_user(user.id).await.unwrap();
        assert!(groups.contains("auditors"));
        assert!(groups.contains("verdict-users"));
        assert!(!groups.contains("unknown-group"));
    }

    #[tokio::test]
    async fn second_request_updates_instead_of_duplicating() {
        let (store, auth) = authenticator(true);
        for email in ["old@example.com", "new@example.com"] {
            let req = TestRequest::get()
                .uri("/")
                .insert_header((SSO_LOGIN_HEADER, "jdoe"))
                .insert_header((SSO_EMAIL_HEADER, email))
                .to_http_request();
            auth.authenticate(&req).await.unwrap().unwrap();
        }
        assert_eq!(store.user_count(), 1);
    }
}
