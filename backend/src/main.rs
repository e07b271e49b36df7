mod config;
mod error;
mod explain;
mod model;
mod routes;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use std::sync::{Arc, Mutex};

use config::Settings;
use model::Classifier;
use routes::configure_routes;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    let settings = Settings::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    log::info!("Loading model from {}", settings.model_path);
    let model = match Classifier::load(&settings.model_path) {
        Ok(model) => model,
        Err(e) => {
            log::error!("Failed to preload model at startup: {:?}", e);
            return Err(std::io::Error::other(format!(
                "Model loading failed: {:?}",
                e
            )));
        }
    };
    log::info!("Model ready on {:?}", model.device());
    let model = Arc::new(Mutex::new(model));

    let bind_address = settings.bind_address.clone();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(model.clone()))
            .app_data(web::Data::new(settings.clone()))
            .configure(|cfg| configure_routes(cfg, settings.static_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
