mod config;
mod handlers;
mod registry;
mod response;
mod runner;
mod sse;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};

use config::{AppState, Settings};
use registry::SessionRegistry;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let settings = Settings::from_env();
    if let Err(err) = std::fs::create_dir_all(&settings.proofs_dir) {
        // Placeholder writes will fail later and be logged per request.
        tracing::warn!(
            "failed to create proofs dir {}: {err}",
            settings.proofs_dir.display()
        );
    }

    tracing::info!(
        "starting blade warrior verification api: bind_addr={} simulation_mode={} proofs_dir={}",
        settings.bind_addr,
        settings.simulation_mode,
        settings.proofs_dir.display()
    );

    let bind_addr = settings.bind_addr.clone();
    let state = AppState {
        registry: Arc::new(SessionRegistry::new()),
        settings: Arc::new(settings),
    };

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .expose_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::JsonConfig::default().limit(state.settings.json_limit_bytes))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .route("/health", web::get().to(handlers::health))
            .route("/api/verify", web::post().to(handlers::verify_score))
            .route(
                "/api/verify/log",
                web::get().to(sse::verification_log_stream),
            )
            .route("/api/proofs", web::get().to(handlers::list_proofs))
    })
    .bind(bind_addr)?
    .run()
    .await
}
