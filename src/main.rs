use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use std::env;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod codes;
mod config;
mod courses;
mod db;
mod error;
mod graph;
mod media;
mod mobile;
mod models;
mod sessions;
mod state;
mod subtitle;
mod token;
mod translate;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "safelearn_server=info,axum=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(config::AppConfig::from_env()?);

    let pool = db::connect(&config.database_url).await?;
    // crate-relative path for sqlx migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    let codes = codes::CodeStore::connect(&config.redis_url).await?;
    let state = state::AppState {
        db: pool,
        handoff: token::TokenCodec::new(config.token_secret.as_bytes()),
        sessions: auth::SessionSigner::new(
            config.token_secret.as_bytes(),
            config.session_ttl_minutes,
        ),
        codes,
        translator: translate::Translator::from_config(&config),
        config: config.clone(),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(auth::router())
        .merge(courses::router())
        .merge(media::router())
        .merge(sessions::router())
        .merge(mobile::router())
        .nest_service("/content", ServeDir::new(config.data_dir.clone()))
        .layer(DefaultBodyLimit::max(200 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on http://0.0.0.0:{}", config.port);

    axum::serve(listener, app).await?;
    Ok(())
}
