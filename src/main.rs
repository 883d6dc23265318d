//! Verdict authentication server - main entry point.
//!
//! Starts the Actix-web server with the authentication routes and the
//! expired-session sweeper.

mod api;
mod auth;
mod config;
mod db;
mod entity;
mod error;
mod middleware;
mod models;
mod services;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, web};
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::auth::hashing::CredentialHasher;
use crate::auth::jwt::TokenCodec;
use crate::auth::oauth::{GitHubProvider, IdentityProviderRegistry, OAuth2Flow};
use crate::auth::password::CredentialsAuthenticator;
use crate::auth::registrar::UserRegistrar;
use crate::auth::request::RequestAuthenticator;
use crate::auth::session::SessionManager;
use crate::auth::sso::SsoAuthenticator;
use crate::auth::tokens::UserTokenAuthenticator;
use crate::auth::webhook::GithubWebhookAuthenticator;
use crate::config::Config;
use crate::db::{Database, Store};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL must be set");
            error!("  - VERDICT_SESSION_TIMEOUT_MINUTES must stay above 5 minutes and within 3 months");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Verdict Authentication Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }
    if config.auth_secret.is_none() {
        warn!(
            "VERDICT_AUTH_SECRET not set; generating a volatile signing secret. \
             Sessions will not survive a restart."
        );
    }

    // Connect to the platform database
    let store: Arc<dyn Store> = match Database::connect(&config).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };
    info!("Database connection established");

    // Install the process-wide signing secret
    let codec = Arc::new(TokenCodec::new());
    if let Err(e) = codec.start(&config) {
        error!("Failed to initialize session token codec: {}", e);
        std::process::exit(1);
    }

    // Assemble the authentication core
    let hasher = Arc::new(CredentialHasher::new(config.pbkdf2_iterations));
    let sessions = Arc::new(SessionManager::new(store.clone(), codec.clone(), &config));
    let tokens = Arc::new(UserTokenAuthenticator::new(store.clone()));
    let registrar = Arc::new(UserRegistrar::new(store.clone(), config.managed_instance));
    let sso = Arc::new(SsoAuthenticator::new(registrar.clone(), config.sso_enabled));
    let webhook = Arc::new(GithubWebhookAuthenticator::new(store.clone()));
    // External and directory realms are plugged in by the platform; none are
    // wired in a standalone deployment.
    let credentials = Arc::new(CredentialsAuthenticator::new(
        store.clone(),
        hasher,
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

    let registry = Arc::new(IdentityProviderRegistry::new(vec![Arc::new(
        GitHubProvider::from_config(&config),
    )]));
    if !registry.keys().is_empty() {
        info!("Identity providers enabled: {}", registry.keys().join(", "));
    }
    let oauth_flow = Arc::new(OAuth2Flow::new(
        registry,
        registrar,
        sessions.clone(),
        &config,
    ));

    // Start the expired-session sweeper
    services::start_cleanup_task(
        store.clone(),
        services::CleanupConfig {
            interval_secs: config.session_sweep_interval_secs,
        },
    );
    info!(
        "Session cleanup service started (interval: {}s)",
        config.session_sweep_interval_secs
    );

    let bind_address = config.bind_address();
    let is_development = config.is_development();
    let worker_count = if is_development {
        4
    } else {
        num_cpus::get()
    };
    info!(
        "Starting server at http://{} ({} workers)",
        bind_address, worker_count
    );

    let app_config = config.clone();
    let server = HttpServer::new(move || {
        let cors = if is_development {
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .allowed_headers(vec![
                    header::AUTHORIZATION,
                    header::ACCEPT,
                    header::CONTENT_TYPE,
                    "X-XSRF-TOKEN".parse().unwrap(),
                ])
                .supports_credentials()
                .max_age(3600)
        } else {
            Cors::default()
                .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .allowed_headers(vec![
                    header::AUTHORIZATION,
                    header::ACCEPT,
                    header::CONTENT_TYPE,
                    "X-XSRF-TOKEN".parse().unwrap(),
                ])
                .max_age(3600)
        };

        App::new()
            .wrap(cors)
            .wrap(middleware::RequestLogger)
            .app_data(web::Data::new(app_config.clone()))
            .app_data(web::Data::from(authenticator.clone()))
            .app_data(web::Data::from(sessions.clone()))
            .app_data(web::Data::from(credentials.clone()))
            .app_data(web::Data::from(oauth_flow.clone()))
            .service(
                web::scope("/api")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_auth_routes),
            )
            .configure(api::configure_session_routes)
    });

    let result = server.workers(worker_count).bind(&bind_address)?.run().await;

    // Shutdown: drop the signing secret.
    codec.stop();
    result
}
