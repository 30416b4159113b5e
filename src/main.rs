use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::from_fn;
use actix_web::{web, App, HttpResponse, HttpServer};
use dotenv::dotenv;
use mflix_gate::auth::authorize;
use mflix_gate::error::ErrorEnvelope;
use mflix_gate::{routes, AppError, AppState, Settings};
use std::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorEnvelope::new(
        actix_web::http::StatusCode::NOT_FOUND,
        "Not Found",
        "No route matches this path",
    ))
}

fn cors(config: &Settings) -> Cors {
    config
        .security
        .allowed_origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers(vec![
            "X-RateLimit-Limit",
            "X-RateLimit-Remaining",
            "X-RateLimit-Reset",
        ])
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> mflix_gate::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Load configuration
    let config = Settings::new()?;
    info!("Configuration loaded successfully ({} mode)", config.environment);

    let state = web::Data::new(AppState::new(config.clone()).await?);

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;
    info!("Starting server at {}:{}", config.server.host, config.server.port);

    let workers = config.server.workers as usize;
    HttpServer::new(move || {
        App::new()
            .wrap(from_fn(authorize))
            .wrap(cors(&config))
            .app_data(state.clone())
            .configure(routes)
            .default_service(web::to(not_found))
    })
    .listen(listener)?
    .workers(workers)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok(())
}
