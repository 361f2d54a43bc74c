use actix_web::{web, App, HttpServer};
use dms::{Config, Service};
use std::path::PathBuf;

mod handlers;

/// Shared application state
pub struct AppState {
    pub service: Service,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();
    log::info!("Starting document management service");

    let config_path = std::env::var("DMS_CONFIG").unwrap_or_else(|_| "dms.yaml".to_string());
    let config = load_config(&PathBuf::from(config_path))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    let service = Service::from_config(&config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let state = web::Data::new(AppState { service });

    let host = config.server.host.clone();
    let port = config.server.port;
    log::info!("Listening on {host}:{port}");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}

fn load_config(path: &std::path::Path) -> dms::Result<Config> {
    let mut config = Config::load(path)?;
    config.apply_env()?;
    Ok(config)
}
