//! Database Versioning Server - Main entry point.
//!
//! Starts the Actix-web server exposing the versioning status and the script
//! execution endpoints.

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, web};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use dbversioning_lib::api::{self, ApiDoc};
use dbversioning_lib::auth::AdminKey;
use dbversioning_lib::config::{ADMIN_KEY_HEADER, Config};
use dbversioning_lib::db::DbPool;
use dbversioning_lib::middleware;
use dbversioning_lib::services::VersioningService;

/// Perform health check (for Docker healthcheck).
async fn health_check() -> bool {
    Config::from_env().is_ok()
}

fn io_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::other(format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    if std::env::args().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        std::process::exit(if health_check().await { 0 } else { 1 });
    }

    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Database Versioning Server");
    info!("  Environment: {}", config.environment);
    info!("  Scripts: {} ({})", config.scripts.dir.display(), config.scripts.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
        info!("Using development defaults for DATABASE_URL and DBV_ADMIN_KEY");
    }
    if config.admin_key.is_none() {
        warn!("DBV_ADMIN_KEY is not set, script execution endpoints are disabled");
    }

    let pool = DbPool::new(&config)
        .await
        .map_err(|e| io_error("Failed to initialize database", e))?;
    info!("Database connection established");

    let bind_address = config.bind_address();
    let service = VersioningService::from_config(&pool, &config, bind_address.clone())
        .map_err(|e| io_error("Failed to initialize versioning engine", e))?;

    match service.controller().setup_versioning_tables().await {
        Ok(true) => info!("Versioning tables ready"),
        Ok(false) => warn!("Target database {} does not exist yet", config.database.name),
        Err(e) => return Err(io_error("Failed to set up versioning tables", e)),
    }

    match service.check_versioning_status().await {
        Ok(result) => info!("Startup status: {}", result.info),
        Err(e) if e.is_fatal() => return Err(io_error("Invalid script package", e)),
        Err(e) => error!("Failed to load versioning status: {}", e),
    }

    let admin_key = AdminKey::new(config.admin_key.clone());
    let is_development = config.is_development();
    let worker_count = if is_development { 2 } else { num_cpus::get() };
    info!(
        "Starting server at http://{} ({} workers)",
        bind_address, worker_count
    );

    let server = HttpServer::new(move || {
        let cors = if is_development {
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
        } else {
            Cors::default()
        }
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
        .allowed_header(ADMIN_KEY_HEADER)
        .max_age(3600);

        App::new()
            // CORS must wrap before other middleware
            .wrap(cors)
            .wrap(middleware::RequestLogger)
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(service.clone()))
            .app_data(web::Data::new(admin_key.clone()))
            .service(
                web::scope("/api/v1")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_versioning_routes),
            )
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    });

    server.workers(worker_count).bind(&bind_address)?.run().await
}
