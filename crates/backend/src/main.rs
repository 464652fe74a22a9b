use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

mod auth;
mod calendar_client;
mod config;
mod db;
pub mod error;
mod handlers;
mod llm;
mod models;
pub mod repository;
mod schema;
mod services;
#[cfg(test)]
mod test_support;

use auth::AuthConfig;
use calendar_client::GoogleCredentials;
use config::AppConfig;
use db::DbPool;
use llm::{OpenRouterClient, SchedulingAgent};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub auth_config: AuthConfig,
    pub config: Arc<AppConfig>,
    pub http: reqwest::Client,
    pub agent: Arc<SchedulingAgent>,
    pub google: GoogleCredentials,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().map_err(anyhow::Error::msg)?;
    let auth_config = AuthConfig::from_env().map_err(anyhow::Error::msg)?;

    let pool = db::establish_connection_pool()?;
    let http = reqwest::Client::new();

    let model = OpenRouterClient::new(http.clone(), &config.agent);
    let agent = SchedulingAgent::new(
        Arc::new(model),
        config.agent.max_retries,
        config.agent.retry_backoff,
    );
    tracing::info!(
        "Scheduling agent using model {} (time zone {})",
        config.agent.model,
        config.time_zone
    );

    let google = GoogleCredentials {
        client_id: auth_config.google_client_id.clone(),
        client_secret: auth_config.google_client_secret.clone(),
    };

    let state = AppState {
        pool,
        auth_config,
        config: Arc::new(config),
        http,
        agent: Arc::new(agent),
        google,
    };

    let protected = Router::new()
        // Goal routes
        .route("/api/goals", get(handlers::list_goals).post(handlers::create_goal))
        .route(
            "/api/goals/:id",
            put(handlers::update_goal).delete(handlers::delete_goal),
        )
        // User config routes
        .route(
            "/api/user-config",
            get(handlers::get_user_config)
                .post(handlers::create_user_config)
                .put(handlers::update_user_config),
        )
        .route(
            "/api/user-config/sync-calendars",
            post(handlers::sync_calendars),
        )
        .route("/api/onboarding", get(handlers::get_onboarding_status))
        // Calendar routes
        .route("/api/calendar/events", get(handlers::get_week_events))
        .route("/api/calendar/week", get(handlers::get_week_layout))
        // Planner routes
        .route("/api/planner", post(handlers::plan_week))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let app = Router::new()
        .route("/health", get(handlers::health_check))
        // Auth routes
        .route("/api/auth/login", get(auth::auth_login))
        .route("/api/auth/callback", get(auth::auth_callback))
        .route("/api/auth/logout", post(auth::auth_logout))
        .route("/api/auth/me", get(auth::auth_me))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
        .with_state(state.clone());

    // Serve static frontend files if the directory exists
    let frontend_dir = &state.config.frontend_dir;
    let app = if std::path::Path::new(frontend_dir).exists() {
        tracing::info!("Serving frontend from {}", frontend_dir);
        let index_path = format!("{}/index.html", frontend_dir);
        let serve_dir = ServeDir::new(frontend_dir).not_found_service(ServeFile::new(&index_path));
        app.fallback_service(serve_dir)
    } else {
        tracing::info!(
            "Frontend directory not found at {}, serving API only",
            frontend_dir
        );
        app
    };

    let addr = state.config.bind_addr;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build CORS layer based on environment configuration.
///
/// If CORS_ALLOWED_ORIGINS is set, only those origins are allowed.
/// If not set, defaults to permissive CORS (for development only).
fn build_cors_layer() -> CorsLayer {
    let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS").ok();

    match allowed_origins {
        Some(origins) => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();

            if origins.is_empty() {
                tracing::warn!(
                    "CORS_ALLOWED_ORIGINS is set but empty, using permissive CORS (not recommended for production)"
                );
                CorsLayer::permissive()
            } else {
                tracing::info!("CORS configured for origins: {:?}", origins);
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods([
                        Method::GET,
                        Method::POST,
                        Method::PUT,
                        Method::DELETE,
                        Method::OPTIONS,
                    ])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                    .allow_credentials(true)
            }
        }
        None => {
            tracing::warn!(
                "CORS_ALLOWED_ORIGINS not set, using permissive CORS (not recommended for production)"
            );
            CorsLayer::permissive()
        }
    }
}
