use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Process configuration, read once at startup.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Public base URL embedded in the QR handoff links.
    pub app_url: String,
    pub database_url: String,
    pub redis_url: String,
    pub data_dir: String,
    pub token_secret: String,
    pub learn_ttl_minutes: i64,
    pub verify_ttl_minutes: i64,
    pub session_ttl_minutes: i64,
    pub translate_api_url: Option<String>,
    pub translate_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: load_or("PORT", 8081),
            app_url: env::var("APP_URL").unwrap_or_else(|_| "http://localhost:8081".into()),
            database_url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()),
            token_secret: env::var("TOKEN_SECRET").context("TOKEN_SECRET not set")?,
            learn_ttl_minutes: load_or("LEARN_TOKEN_TTL_MINUTES", 240),
            verify_ttl_minutes: load_or("VERIFY_TOKEN_TTL_MINUTES", 60),
            session_ttl_minutes: load_or("SESSION_TTL_MINUTES", 720),
            translate_api_url: env::var("TRANSLATE_API_URL").ok(),
            translate_api_key: env::var("TRANSLATE_API_KEY").ok(),
        })
    }
}

fn load_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
