use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::core::auth::get_current_user;
use crate::core::generation_service::{GenerationService, ModelSelector};
use crate::core::quota_service::QuotaService;
use crate::infrastructure::database::{
    Database, ImagesRepository, JobsRepository, SubscriptionsRepository, UsersRepository,
};
use crate::infrastructure::storage::StorageService;
use crate::services::providers::InferenceProvider;
use crate::utils::config::Config;
use crate::utils::error::Result;

/// Requête de génération à la demande
#[derive(Deserialize, Validate)]
pub struct GenerateRequest {
    #[validate(length(min = 1, max = 1000, message = "Le prompt est requis (1000 caractères max)"))]
    pub prompt: String,
    pub model: ModelSelector,
}

fn generation_service(
    db: &web::Data<Database>,
    storage: &web::Data<StorageService>,
    config: &web::Data<Config>,
    inference: &web::Data<dyn InferenceProvider>,
) -> GenerationService {
    GenerationService::new(
        ImagesRepository::new(db.pool.clone()),
        JobsRepository::new(db.pool.clone()),
        QuotaService::new(
            SubscriptionsRepository::new(db.pool.clone()),
            UsersRepository::new(db.pool.clone()),
            config.free_lifetime_generations,
        ),
        storage.clone().into_inner(),
        inference.clone().into_inner(),
        config.pretrained_models.clone(),
        config.starter_batch_width,
        config.starter_batch_pause_ms,
    )
}

/// Génère une image sur un modèle entraîné ou pré-entraîné
#[post("/generations")]
pub async fn create_generation(
    req: HttpRequest,
    request: web::Json<GenerateRequest>,
    db: web::Data<Database>,
    storage: web::Data<StorageService>,
    config: web::Data<Config>,
    inference: web::Data<dyn InferenceProvider>,
) -> Result<HttpResponse> {
    request.validate()?;

    let users_repo = UsersRepository::new(db.pool.clone());
    let user = get_current_user(&req, &config.jwt_secret, &users_repo).await?;

    let service = generation_service(&db, &storage, &config, &inference);
    let request = request.into_inner();
    let image = service
        .generate_on_demand(&user.id, &request.prompt, request.model)
        .await?;

    let download_url = storage.download_url(&image.storage_path, 24).await?;

    Ok(HttpResponse::Created().json(json!({
        "image": image,
        "download_url": download_url
    })))
}

/// Liste les images de l'appelant
#[get("/generations")]
pub async fn list_generations(
    req: HttpRequest,
    db: web::Data<Database>,
    storage: web::Data<StorageService>,
    config: web::Data<Config>,
    inference: web::Data<dyn InferenceProvider>,
) -> Result<HttpResponse> {
    let users_repo = UsersRepository::new(db.pool.clone());
    let user = get_current_user(&req, &config.jwt_secret, &users_repo).await?;

    let service = generation_service(&db, &storage, &config, &inference);
    let images = service.list_images(&user.id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "count": images.len(),
        "images": images
    })))
}
