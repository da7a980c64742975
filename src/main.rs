use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portrait_platform::api::routes;
use portrait_platform::infrastructure::database::Database;
use portrait_platform::infrastructure::storage::StorageService;
use portrait_platform::services::providers::{InferenceProvider, TrainingProvider};
use portrait_platform::services::replicate::ReplicateClient;
use portrait_platform::utils::config::Config;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialisation du logging
    setup_tracing();
    info!("🚀 Démarrage de Portrait Platform Backend");

    // Chargement de la configuration
    let config = Config::from_env().expect("❌ Impossible de charger la configuration");
    info!("✅ Configuration chargée avec succès");
    info!("🔧 Mode: {}", config.run_mode);

    // Initialisation des services
    let db = Database::new(&config.database_url, config.database_max_connections)
        .await
        .expect("❌ Impossible d'ouvrir la base de données");

    let storage = StorageService::new(
        config.s3_endpoint.as_deref(),
        config.s3_access_key.as_deref(),
        config.s3_secret_key.as_deref(),
        &config.s3_bucket,
        &config.local_storage_dir,
    );

    let replicate = Arc::new(ReplicateClient::new(
        &config.provider_base_url,
        &config.provider_api_token,
    ));
    let training_provider: Arc<dyn TrainingProvider> = replicate.clone();
    let inference_provider: Arc<dyn InferenceProvider> = replicate;

    info!(
        "🔗 Fournisseur d'entraînement: {} (callback {})",
        config.provider_base_url,
        config.webhook_callback_url()
    );

    let host = config.server_host.clone();
    let port = config.server_port;
    let workers = config.workers;

    let db_data = web::Data::new(db);
    let storage_data = web::Data::new(storage);
    let config_data = web::Data::new(config);
    let training_data: web::Data<dyn TrainingProvider> = web::Data::from(training_provider);
    let inference_data: web::Data<dyn InferenceProvider> = web::Data::from(inference_provider);

    // Configuration du serveur Actix-Web
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .app_data(db_data.clone())
            .app_data(storage_data.clone())
            .app_data(config_data.clone())
            .app_data(training_data.clone())
            .app_data(inference_data.clone())
            .service(routes::health)
            .configure(routes::config)
    })
    .bind(format!("{}:{}", host, port))?
    .workers(workers)
    .shutdown_timeout(10);

    info!("✅ Backend démarré avec succès!");
    info!("🔗 API disponible sur http://{}:{}", host, port);

    server.run().await
}

/// Configure le tracing pour le logging structuré
fn setup_tracing() {
    let log_level = env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".into())
        .parse()
        .unwrap_or(tracing::Level::INFO);

    let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "json".into());

    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(log_level.into()),
        )
        .with(if log_format == "json" {
            Box::new(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(true),
            ) as Box<dyn tracing_subscriber::Layer<_> + Send + Sync>
        } else {
            Box::new(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_line_number(true)
                    .with_file(true),
            ) as Box<dyn tracing_subscriber::Layer<_> + Send + Sync>
        });

    subscriber.init();
}
