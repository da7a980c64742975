use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use crate::core::auth::get_current_user;
use crate::core::dataset_service::{CompletedUpload, DatasetService};
use crate::infrastructure::database::{AssetsRepository, Database, UsersRepository};
use crate::infrastructure::storage::StorageService;
use crate::models::UploadedAsset;
use crate::utils::config::Config;
use crate::utils::error::Result;

/// Callback de fin d'upload: la photo est déjà déposée dans le stockage blob
#[derive(Deserialize, Validate)]
pub struct CompleteUploadRequest {
    #[validate(length(min = 1, message = "session_id est requis"))]
    pub session_id: String,
    #[validate(length(min = 1, message = "storage_path est requis"))]
    pub storage_path: String,
    #[validate(length(min = 1, message = "content_type est requis"))]
    pub content_type: String,
    #[validate(range(min = 1, message = "size_bytes doit être positif"))]
    pub size_bytes: i64,
}

#[derive(Serialize)]
pub struct SessionAssetsResponse {
    pub session_id: String,
    pub count: usize,
    pub assets: Vec<UploadedAsset>,
}

fn dataset_service(
    db: &web::Data<Database>,
    storage: &web::Data<StorageService>,
    config: &web::Data<Config>,
) -> DatasetService {
    DatasetService::new(
        AssetsRepository::new(db.pool.clone()),
        storage.clone().into_inner(),
        config.max_asset_size_mb,
    )
}

/// Ouvre une session d'upload
#[post("/uploads/sessions")]
pub async fn begin_session(
    req: HttpRequest,
    db: web::Data<Database>,
    storage: web::Data<StorageService>,
    config: web::Data<Config>,
) -> Result<HttpResponse> {
    let users_repo = UsersRepository::new(db.pool.clone());
    get_current_user(&req, &config.jwt_secret, &users_repo).await?;

    let service = dataset_service(&db, &storage, &config);
    let session_id = service.begin_session();

    Ok(HttpResponse::Created().json(json!({ "session_id": session_id })))
}

/// Enregistre une photo uploadée dans sa session
#[post("/uploads/complete")]
pub async fn complete_upload(
    req: HttpRequest,
    request: web::Json<CompleteUploadRequest>,
    db: web::Data<Database>,
    storage: web::Data<StorageService>,
    config: web::Data<Config>,
) -> Result<HttpResponse> {
    request.validate()?;

    let users_repo = UsersRepository::new(db.pool.clone());
    let user = get_current_user(&req, &config.jwt_secret, &users_repo).await?;

    let service = dataset_service(&db, &storage, &config);
    let asset = service
        .record_asset(
            &user.id,
            &request.session_id,
            CompletedUpload {
                storage_path: request.storage_path.clone(),
                content_type: request.content_type.clone(),
                size_bytes: request.size_bytes,
            },
        )
        .await?;

    Ok(HttpResponse::Created().json(asset))
}

/// Liste les photos d'une session de l'appelant
#[get("/uploads/sessions/{id}")]
pub async fn list_session(
    req: HttpRequest,
    path: web::Path<String>,
    db: web::Data<Database>,
    storage: web::Data<StorageService>,
    config: web::Data<Config>,
) -> Result<HttpResponse> {
    let session_id = path.into_inner();

    let users_repo = UsersRepository::new(db.pool.clone());
    let user = get_current_user(&req, &config.jwt_secret, &users_repo).await?;

    let service = dataset_service(&db, &storage, &config);
    let assets = service.list_session(&user.id, &session_id).await?;

    Ok(HttpResponse::Ok().json(SessionAssetsResponse {
        session_id,
        count: assets.len(),
        assets,
    }))
}
