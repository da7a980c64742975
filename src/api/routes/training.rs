use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::core::auth::get_current_user;
use crate::core::dataset_service::DatasetService;
use crate::core::generation_service::GenerationService;
use crate::core::quota_service::QuotaService;
use crate::core::reconciler::Reconciler;
use crate::core::training_service::TrainingService;
use crate::infrastructure::database::{
    AssetsRepository, Database, ImagesRepository, JobsRepository, SubscriptionsRepository,
    UsersRepository,
};
use crate::infrastructure::storage::StorageService;
use crate::services::providers::{InferenceProvider, TrainingProvider};
use crate::utils::config::Config;
use crate::utils::error::Result;

/// Requête de lancement d'un entraînement
#[derive(Deserialize, Validate)]
pub struct StartTrainingRequest {
    #[validate(length(min = 1, message = "session_id est requis"))]
    pub session_id: String,
    #[validate(length(min = 1, message = "Le sujet est requis"))]
    pub subject: String,
}

pub(super) fn training_service(
    db: &web::Data<Database>,
    storage: &web::Data<StorageService>,
    config: &web::Data<Config>,
    provider: &web::Data<dyn TrainingProvider>,
) -> TrainingService {
    let assets = AssetsRepository::new(db.pool.clone());
    TrainingService::new(
        JobsRepository::new(db.pool.clone()),
        assets.clone(),
        DatasetService::new(assets, storage.clone().into_inner(), config.max_asset_size_mb),
        provider.clone().into_inner(),
        &config.provider_model_owner,
        &config.webhook_callback_url(),
    )
}

pub(super) fn reconciler(
    db: &web::Data<Database>,
    storage: &web::Data<StorageService>,
    config: &web::Data<Config>,
    provider: &web::Data<dyn TrainingProvider>,
    inference: &web::Data<dyn InferenceProvider>,
) -> Reconciler {
    let generation = GenerationService::new(
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
    );

    Reconciler::new(
        JobsRepository::new(db.pool.clone()),
        provider.clone().into_inner(),
        Arc::new(generation),
    )
}

/// Lance un entraînement sur les photos de la session
#[post("/training")]
pub async fn start_training(
    req: HttpRequest,
    request: web::Json<StartTrainingRequest>,
    db: web::Data<Database>,
    storage: web::Data<StorageService>,
    config: web::Data<Config>,
    provider: web::Data<dyn TrainingProvider>,
) -> Result<HttpResponse> {
    request.validate()?;

    let users_repo = UsersRepository::new(db.pool.clone());
    let user = get_current_user(&req, &config.jwt_secret, &users_repo).await?;

    let service = training_service(&db, &storage, &config, &provider);
    let job = service
        .start_training(&user.id, &request.session_id, &request.subject)
        .await?;

    Ok(HttpResponse::Accepted().json(json!({
        "job": job,
        "message": "Entraînement soumis, le statut sera rapporté par webhook"
    })))
}

/// Statut d'un job; interroge le fournisseur si le job n'est pas terminal
#[get("/training/{id}")]
pub async fn get_training(
    req: HttpRequest,
    path: web::Path<String>,
    db: web::Data<Database>,
    storage: web::Data<StorageService>,
    config: web::Data<Config>,
    provider: web::Data<dyn TrainingProvider>,
    inference: web::Data<dyn InferenceProvider>,
) -> Result<HttpResponse> {
    let job_id = path.into_inner();

    let users_repo = UsersRepository::new(db.pool.clone());
    let user = get_current_user(&req, &config.jwt_secret, &users_repo).await?;

    let service = training_service(&db, &storage, &config, &provider);
    let job = service.get_job(&user.id, &job_id).await?;

    // Filet de sécurité pour les webhooks perdus
    let job = reconciler(&db, &storage, &config, &provider, &inference)
        .refresh_if_pending(&user.id, job)
        .await?;

    Ok(HttpResponse::Ok().json(job))
}

/// Liste les jobs de l'appelant
#[get("/training")]
pub async fn list_trainings(
    req: HttpRequest,
    db: web::Data<Database>,
    storage: web::Data<StorageService>,
    config: web::Data<Config>,
    provider: web::Data<dyn TrainingProvider>,
) -> Result<HttpResponse> {
    let users_repo = UsersRepository::new(db.pool.clone());
    let user = get_current_user(&req, &config.jwt_secret, &users_repo).await?;

    let service = training_service(&db, &storage, &config, &provider);
    let jobs = service.list_jobs(&user.id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "count": jobs.len(),
        "jobs": jobs
    })))
}
