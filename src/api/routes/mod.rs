use actix_web::{get, web, HttpResponse, Responder};
use serde_json::json;

pub mod generations;
pub mod subscriptions;
pub mod training;
pub mod uploads;
pub mod webhooks;

/// Sonde de vie
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "portrait-platform",
        "version": crate::VERSION
    }))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // Sessions d'upload
            .service(uploads::begin_session)
            .service(uploads::complete_upload)
            .service(uploads::list_session)
            // Entraînements
            .service(training::start_training)
            .service(training::get_training)
            .service(training::list_trainings)
            // Webhooks du fournisseur
            .service(webhooks::training_webhook)
            // Générations
            .service(generations::create_generation)
            .service(generations::list_generations)
            // Abonnements
            .service(subscriptions::get_usage),
    );
}
