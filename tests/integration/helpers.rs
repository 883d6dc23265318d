//! Shared fixture: the fully wired authentication stack over a MemoryStore.

use actix_web::web;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use verdict_auth::auth::hashing::CredentialHasher;
use verdict_auth::auth::jwt::TokenCodec;
use verdict_auth::auth::oauth::{IdentityProviderRegistry, OAuth2Flow};
use verdict_auth::auth::password::CredentialsAuthenticator;
use verdict_auth::auth::registrar::UserRegistrar;
use verdict_auth::auth::request::RequestAuthenticator;
use verdict_auth::auth::session::SessionManager;
use verdict_auth::auth::sso::SsoAuthenticator;
use verdict_auth::auth::tokens::UserTokenAuthenticator;
use verdict_auth::auth::webhook::GithubWebhookAuthenticator;
use verdict_auth::config::{Config, Environment, GitHubOAuthSettings};
use verdict_auth::db::memory::MemoryStore;
use verdict_auth::db::{Store, UserStore};
use verdict_auth::models::User;

pub const DEFAULT_GROUP: &str = "verdict-users";

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub codec: Arc<TokenCodec>,
    pub hasher: Arc<CredentialHasher>,
    pub config: web::Data<Config>,
    pub authenticator: web::Data<RequestAuthenticator>,
    pub sessions: web::Data<SessionManager>,
    pub credentials: web::Data<CredentialsAuthenticator>,
    pub oauth: web::Data<OAuth2Flow>,
}

pub fn test_config(sso_enabled: bool) -> Config {
    Config {
        environment: Environment::Development,
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: String::new(),
        context_path: String::new(),
        auth_secret: None,
        session_timeout_minutes: 60,
        pbkdf2_iterations: 2,
        force_password_reset_redirect: true,
        sso_enabled,
        managed_instance: false,
        session_sweep_interval_secs: 3600,
        github_oauth: GitHubOAuthSettings {
            enabled: false,
            client_id: None,
            client_secret: None,
            allow_signup: true,
            redirect_url: None,
        },
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(test_config(false))
    }

    pub fn with_sso() -> Self {
        Self::with_config(test_config(true))
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        store.add_group(DEFAULT_GROUP, true);
        let dyn_store: Arc<dyn Store> = store.clone();

        let codec = Arc::new(TokenCodec::new());
        codec.start(&config).unwrap();
        let hasher = Arc::new(CredentialHasher::new(config.pbkdf2_iterations));

        let sessions = Arc::new(SessionManager::new(
            dyn_store.clone(),
            codec.clone(),
            &config,
        ));
        let tokens = Arc::new(UserTokenAuthenticator::new(dyn_store.clone()));
        let registrar = Arc::new(UserRegistrar::new(
            dyn_store.clone(),
            config.managed_instance,
        ));
        let sso = Arc::new(SsoAuthenticator::new(registrar.clone(), config.sso_enabled));
        let webhook = Arc::new(GithubWebhookAuthenticator::new(dyn_store.clone()));
        let credentials = Arc::new(CredentialsAuthenticator::new(
            dyn_store.clone(),
            hasher.clone(),
            None,
            None,
        ));
        let authenticator = Arc::new(RequestAuthenticator::new(
            sso,
            sessions.clone(),
            tokens,
            webhook,
            credentials.clone(),
        ));
        let registry = Arc::new(IdentityProviderRegistry::new(Vec::new()));
        let oauth = Arc::new(OAuth2Flow::new(
            registry,
            registrar,
            sessions.clone(),
            &config,
        ));

        Self {
            store,
            codec,
            hasher,
            config: web::Data::new(config),
            authenticator: web::Data::from(authenticator),
            sessions: web::Data::from(sessions),
            credentials: web::Data::from(credentials),
            oauth: web::Data::from(oauth),
        }
    }

    /// Seed an active local user with a freshly hashed password.
    pub async fn seed_local_user(&self, login: &str, password: &str) -> User {
        let hashed = self.hasher.hash(password);
        let user = User {
            id: Uuid::new_v4(),
            login: login.to_string(),
            name: Some(login.to_string()),
            email: Some(format!("{login}@example.com")),
            active: true,
            local: true,
            external_identity_provider: None,
            external_id: None,
            external_login: None,
            hash_method: Some(hashed.method.as_str().to_string()),
            crypted_password: Some(hashed.digest),
            salt: hashed.salt,
            reset_password: false,
            created_at: Utc::now(),
            last_login_at: None,
        };
        self.store.insert_user(user.clone()).await.unwrap();
        user
    }
}
