//! Showcase Backend
//!
//! Aggregates a GitHub organization's members, repositories and commit activity for the
//! showcase website, with SQLite-backed caching, blog posts and emoji reactions.

mod activity;
mod aggregate;
mod api;
mod blog;
mod cache;
mod config;
mod db;
mod errors;
mod github;
mod models;
mod reactions;
mod retry;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cache::ProcessState;
use config::{Config, DEFAULT_REACTION_SALT};
use db::Store;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub cache: Arc<ProcessState>,
    pub config: Arc<Config>,
    pub http: reqwest::Client,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Showcase Backend");
    tracing::info!("GitHub organization: {}", config.github_org);
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.github_token.is_none() {
        tracing::warn!("No GITHUB_TOKEN configured. Unauthenticated requests are heavily rate limited!");
    }
    if config.reaction_salt == DEFAULT_REACTION_SALT {
        tracing::warn!("Using the built-in reaction salt. Set SHOWCASE_REACTION_SALT in production.");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let store = Arc::new(Store::new(pool));

    let http = github::build_http_client(&config)?;

    // Create application state
    let state = AppState {
        store,
        cache: Arc::new(ProcessState::new()),
        config: Arc::new(config.clone()),
        http,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/github", get(api::get_github))
        .route(
            "/blog/{slug}/reactions",
            get(api::get_reactions).post(api::react),
        );

    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
