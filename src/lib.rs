pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, HttpResponse};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{RateLimitConfig, RateLimiter, SessionCookies};
pub use db::{PgUserRepository, User, UserRepository};
pub use store::CounterStore;

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Registers the health probe and the auth endpoints.
pub fn routes(cfg: &mut web::ServiceConfig) {
    use auth::handlers::{login, logout, register, verify};

    cfg.route("/health", web::get().to(health_check)).service(
        web::scope("/api/auth")
            .route("/login", web::post().to(login))
            .route("/register", web::post().to(register))
            .route("/logout", web::post().to(logout))
            .route("/verify", web::get().to(verify)),
    );
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<SessionCookies>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        config.validate()?;

        let users = PgUserRepository::connect(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(5),
        )
        .await?;
        users.migrate().await?;

        let store = store::from_settings(&config.rate_limit)?;

        Ok(Self::from_parts(config, Arc::new(users), store))
    }

    pub fn from_parts(
        config: Settings,
        users: Arc<dyn UserRepository>,
        store: Arc<dyn CounterStore>,
    ) -> Self {
        let sessions = SessionCookies::from_settings(&config);
        let rate_limiter = RateLimiter::new(store, RateLimitConfig::from_settings(&config.rate_limit));

        Self {
            config: Arc::new(config),
            users,
            sessions: Arc::new(sessions),
            rate_limiter: Arc::new(rate_limiter),
        }
    }
}
