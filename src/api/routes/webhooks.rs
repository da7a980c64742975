use actix_web::{post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::api::routes::training::reconciler;
use crate::infrastructure::database::Database;
use crate::infrastructure::storage::StorageService;
use crate::services::providers::{
    parse_status_report, InferenceProvider, ProviderOutput, TrainingProvider,
};
use crate::utils::config::Config;
use crate::utils::error::{AppError, Result};
use crate::utils::security::verify_webhook_signature;

/// Corps d'une livraison webhook du fournisseur
#[derive(Debug, Deserialize)]
struct WebhookPayload {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<ProviderOutput>,
    #[serde(default)]
    error: Option<String>,
}

fn required_header<'a>(req: &'a HttpRequest, name: &str) -> Result<&'a str> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::InvalidSignature)
}

/// Ingestion des webhooks d'entraînement
///
/// Corps brut: la signature HMAC couvre les octets exacts de la livraison,
/// elle est vérifiée avant tout décodage. Les livraisons anormales ou en
/// retard sont acquittées en 200 pour arrêter les retries du fournisseur;
/// seules les signatures invalides valent 401.
#[post("/webhooks/training")]
pub async fn training_webhook(
    req: HttpRequest,
    body: web::Bytes,
    db: web::Data<Database>,
    storage: web::Data<StorageService>,
    config: web::Data<Config>,
    provider: web::Data<dyn TrainingProvider>,
    inference: web::Data<dyn InferenceProvider>,
) -> Result<HttpResponse> {
    let webhook_id = required_header(&req, "webhook-id")?;
    let timestamp = required_header(&req, "webhook-timestamp")?;
    let signature = required_header(&req, "webhook-signature")?;

    verify_webhook_signature(
        &config.webhook_secret,
        webhook_id,
        timestamp,
        &body,
        signature,
        Utc::now(),
    )?;

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::ParseError(format!("Livraison webhook illisible: {}", e)))?;
    let report = parse_status_report(
        &payload.status,
        payload.output.as_ref(),
        payload.error.as_deref(),
    )?;

    let outcome = reconciler(&db, &storage, &config, &provider, &inference)
        .apply_and_dispatch(&payload.id, report)
        .await;

    match outcome {
        Ok(outcome) => Ok(HttpResponse::Ok().json(json!({
            "status": "processed",
            "job_status": outcome.job.status
        }))),
        // Transition anormale: journalisée par le réconciliateur, acquittée
        // pour que le fournisseur cesse de relivrer
        Err(AppError::AnomalousTransition(detail)) => {
            tracing::warn!("⚠️  Livraison webhook {} ignorée: {}", webhook_id, detail);
            Ok(HttpResponse::Ok().json(json!({ "status": "ignored" })))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TrainingJob, TrainingStatus};
    use crate::infrastructure::database::JobsRepository;
    use crate::services::providers::fakes::{FakeInferenceProvider, FakeTrainingProvider};
    use crate::test_utils::create_test_pool;
    use crate::utils::security::sign_webhook;
    use actix_web::{test, web::Data, App};
    use std::sync::Arc;
    use uuid::Uuid;

    const SECRET: &str = "whsec_dGVzdC1zZWNyZXQtdGVzdC1zZWNyZXQ=";

    fn test_config() -> Config {
        Config {
            run_mode: "test".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            workers: 1,
            log_level: "debug".to_string(),
            database_url: "sqlite::memory:".to_string(),
            database_max_connections: 1,
            jwt_secret: "test-jwt-secret-test-jwt-secret!".to_string(),
            webhook_secret: SECRET.to_string(),
            s3_endpoint: None,
            s3_access_key: None,
            s3_secret_key: None,
            s3_bucket: String::new(),
            local_storage_dir: std::env::temp_dir()
                .join(format!("portrait-webhook-{}", Uuid::new_v4()))
                .to_str()
                .unwrap()
                .to_string(),
            max_asset_size_mb: 50,
            provider_api_token: "test-token".to_string(),
            provider_base_url: "https://provider.example.test".to_string(),
            provider_model_owner: "portrait-platform".to_string(),
            public_base_url: "https://api.example.test".to_string(),
            starter_batch_width: 2,
            starter_batch_pause_ms: 0,
            free_lifetime_generations: 3,
            pretrained_models: vec![],
        }
    }

    async fn spawn_app(
        pool: sqlx::SqlitePool,
    ) -> impl actix_web::dev::Service<
        actix_http::Request,
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
    > {
        let config = test_config();
        let storage = StorageService::new_local(&config.local_storage_dir);
        let training: Arc<dyn TrainingProvider> = Arc::new(FakeTrainingProvider::new());
        let inference: Arc<dyn InferenceProvider> = Arc::new(FakeInferenceProvider::new());

        test::init_service(
            App::new()
                .app_data(Data::new(Database::new_with_pool(pool)))
                .app_data(Data::new(storage))
                .app_data(Data::new(config))
                .app_data(Data::from(training))
                .app_data(Data::from(inference))
                .service(training_webhook),
        )
        .await
    }

    async fn seed_job(pool: &sqlx::SqlitePool, status: TrainingStatus) -> TrainingJob {
        let job = TrainingJob::new(
            format!("train-{}", Uuid::new_v4()),
            Uuid::new_v4(),
            "femme".to_string(),
            status,
            "portrait-platform/portrait-test".to_string(),
        );
        JobsRepository::new(pool.clone()).create(&job).await.unwrap()
    }

    fn signed_request(body: &str, signature: &str) -> actix_http::Request {
        let timestamp = Utc::now().timestamp();
        test::TestRequest::post()
            .uri("/webhooks/training")
            .insert_header(("webhook-id", "msg_1"))
            .insert_header(("webhook-timestamp", timestamp.to_string()))
            .insert_header(("webhook-signature", signature.to_string()))
            .set_payload(body.to_string())
            .to_request()
    }

    fn sign(body: &str) -> String {
        sign_webhook(SECRET, "msg_1", Utc::now().timestamp(), body.as_bytes()).unwrap()
    }

    #[actix_web::test]
    async fn test_signed_success_delivery_is_processed() {
        let pool = create_test_pool().await;
        let job = seed_job(&pool, TrainingStatus::Processing).await;
        let app = spawn_app(pool.clone()).await;

        let body = serde_json::json!({
            "id": job.id,
            "status": "succeeded",
            "output": { "version": "owner/m:v1" }
        })
        .to_string();

        let response = test::call_service(&app, signed_request(&body, &sign(&body))).await;
        assert_eq!(response.status(), 200);

        let stored = JobsRepository::new(pool).get_by_id(&job.id).await.unwrap();
        assert_eq!(stored.status, TrainingStatus::Succeeded);
        assert_eq!(stored.model_reference.as_deref(), Some("owner/m:v1"));
    }

    #[actix_web::test]
    async fn test_forged_signature_is_rejected() {
        let pool = create_test_pool().await;
        let job = seed_job(&pool, TrainingStatus::Processing).await;
        let app = spawn_app(pool.clone()).await;

        let body = serde_json::json!({
            "id": job.id,
            "status": "succeeded",
            "output": { "version": "owner/m:v1" }
        })
        .to_string();

        let response =
            test::call_service(&app, signed_request(&body, "v1,Zm9yZ2VkLXNpZ25hdHVyZQ==")).await;
        assert_eq!(response.status(), 401);

        // La livraison forgée n'a pas touché au job
        let stored = JobsRepository::new(pool).get_by_id(&job.id).await.unwrap();
        assert_eq!(stored.status, TrainingStatus::Processing);
    }

    #[actix_web::test]
    async fn test_missing_signature_headers_are_rejected() {
        let pool = create_test_pool().await;
        let app = spawn_app(pool).await;

        let request = test::TestRequest::post()
            .uri("/webhooks/training")
            .set_payload("{}")
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 401);
    }

    #[actix_web::test]
    async fn test_anomalous_delivery_is_acknowledged_as_ignored() {
        let pool = create_test_pool().await;
        let job = seed_job(&pool, TrainingStatus::Processing).await;
        JobsRepository::new(pool.clone())
            .fail(&job.id, "out of memory")
            .await
            .unwrap();
        let app = spawn_app(pool.clone()).await;

        // succeeded livré après failed: acquitté pour stopper les retries
        let body = serde_json::json!({
            "id": job.id,
            "status": "succeeded",
            "output": { "version": "owner/m:v1" }
        })
        .to_string();

        let response = test::call_service(&app, signed_request(&body, &sign(&body))).await;
        assert_eq!(response.status(), 200);
        let payload: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(payload["status"], "ignored");

        let stored = JobsRepository::new(pool).get_by_id(&job.id).await.unwrap();
        assert_eq!(stored.status, TrainingStatus::Failed);
    }

    #[actix_web::test]
    async fn test_unknown_provider_status_is_bad_request() {
        let pool = create_test_pool().await;
        let job = seed_job(&pool, TrainingStatus::Queued).await;
        let app = spawn_app(pool).await;

        let body = serde_json::json!({ "id": job.id, "status": "paused" }).to_string();
        let response = test::call_service(&app, signed_request(&body, &sign(&body))).await;
        assert_eq!(response.status(), 400);
    }
}
