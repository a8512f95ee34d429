use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use catalog_admin::{
    config::{AppConfig, MongoConfig},
    defaults::DefaultGroups,
    handlers,
    session::SessionRegistry,
    store::{MongoProductStore, ProductStore},
    upload::{DiskImageStore, ImageStore, UploadLimit},
};
use tracing::{error, info, Level};
use tracing_subscriber::{self, EnvFilter};
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("actix_web=info".parse().unwrap())
                .add_directive("catalog_admin=debug".parse().unwrap())
        )
        .init();

    info!("Starting catalog admin server");

    let config = AppConfig::from_env();

    let defaults = DefaultGroups::load(&config.default_groups_path).map_err(|e| {
        error!("{}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
    })?;

    let mongo_config = MongoConfig::init(&config)
        .await
        .expect("Failed to initialize MongoDB");

    info!("MongoDB connection established");

    let store: Arc<dyn ProductStore> = Arc::new(MongoProductStore::new(&mongo_config));
    let images: Arc<dyn ImageStore> = Arc::new(DiskImageStore::new(
        config.upload_dir.clone(),
        config.public_upload_url.clone(),
        config.max_upload_bytes,
    ));
    let store_data = web::Data::from(store);
    let images_data = web::Data::from(images);
    let upload_limit = web::Data::new(UploadLimit(config.max_upload_bytes));
    let registry = web::Data::new(SessionRegistry::new(chrono::Duration::seconds(
        config.session_ttl_secs,
    )));

    let sweeper = registry.clone();
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            sweeper.evict_idle();
        }
    });

    let defaults = web::Data::new(defaults);

    info!("Listening on {}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .app_data(store_data.clone())
            .app_data(images_data.clone())
            .app_data(upload_limit.clone())
            .app_data(registry.clone())
            .app_data(defaults.clone())
            .configure(handlers::configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
