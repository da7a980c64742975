// utils/config.rs
use crate::utils::error::{AppError, Result};
use dotenv::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Environnement et serveur
    pub run_mode: String,
    pub server_host: String,
    pub server_port: u16,
    pub workers: usize,
    pub log_level: String,

    // Base de données
    pub database_url: String,
    pub database_max_connections: u32,

    // Sécurité
    pub jwt_secret: String,
    pub webhook_secret: String,

    // MinIO/S3
    pub s3_endpoint: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub s3_bucket: String,
    pub local_storage_dir: String,
    pub max_asset_size_mb: u64,

    // Fournisseur d'entraînement/inférence externe
    pub provider_api_token: String,
    pub provider_base_url: String,
    pub provider_model_owner: String,

    // URL publique de l'API, utilisée pour enregistrer le callback webhook
    pub public_base_url: String,

    // Génération
    pub starter_batch_width: usize,
    pub starter_batch_pause_ms: u64,
    pub free_lifetime_generations: i64,
    pub pretrained_models: Vec<String>,
}

impl Config {
    /// Charger la configuration depuis les variables d'environnement
    pub fn from_env() -> Result<Self> {
        // Charger le fichier .env si présent
        let _ = dotenv().ok();

        // Variables requises
        let required_vars = [
            "DATABASE_URL",
            "JWT_SECRET",
            "WEBHOOK_SECRET",
            "S3_BUCKET",
            "PROVIDER_API_TOKEN",
        ];

        for var in &required_vars {
            if env::var(var).is_err() {
                return Err(AppError::Validation(format!(
                    "Variable d'environnement requise manquante: {}", var
                )));
            }
        }

        let config = Config {
            // Environnement et serveur
            run_mode: env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string()),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_var("SERVER_PORT", 8080)?,
            workers: parse_var("WORKERS", 4)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            // Base de données
            database_url: env::var("DATABASE_URL").map_err(|_| {
                AppError::Validation("DATABASE_URL manquante".to_string())
            })?,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 20)?,

            // Sécurité
            jwt_secret: env::var("JWT_SECRET").unwrap_or_default(),
            webhook_secret: env::var("WEBHOOK_SECRET").unwrap_or_default(),

            // MinIO/S3
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            s3_access_key: env::var("S3_ACCESS_KEY").ok(),
            s3_secret_key: env::var("S3_SECRET_KEY").ok(),
            s3_bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "portraits".to_string()),
            local_storage_dir: env::var("LOCAL_STORAGE_DIR")
                .unwrap_or_else(|_| "./storage".to_string()),
            max_asset_size_mb: parse_var("MAX_ASSET_SIZE_MB", 50)?,

            // Fournisseur externe
            provider_api_token: env::var("PROVIDER_API_TOKEN").unwrap_or_default(),
            provider_base_url: env::var("PROVIDER_BASE_URL")
                .unwrap_or_else(|_| "https://api.replicate.com/v1".to_string()),
            provider_model_owner: env::var("PROVIDER_MODEL_OWNER")
                .unwrap_or_else(|_| "portrait-platform".to_string()),

            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),

            // Génération
            starter_batch_width: parse_var("STARTER_BATCH_WIDTH", 2)?,
            starter_batch_pause_ms: parse_var("STARTER_BATCH_PAUSE_MS", 1000)?,
            free_lifetime_generations: parse_var("FREE_LIFETIME_GENERATIONS", 3)?,
            pretrained_models: env::var("PRETRAINED_MODELS")
                .unwrap_or_else(|_| "flux-schnell,sdxl".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        if config.jwt_secret.len() < 32 {
            tracing::warn!("⚠️  JWT_SECRET trop court (< 32 caractères) - risque de sécurité");
        }

        Ok(config)
    }

    /// URL de callback enregistrée auprès du fournisseur lors de la soumission
    pub fn webhook_callback_url(&self) -> String {
        format!("{}/api/webhooks/training", self.public_base_url.trim_end_matches('/'))
    }
}

/// Parse une variable d'environnement numérique avec valeur par défaut
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(|_| {
            AppError::Validation(format!("{} doit être un nombre", name))
        }),
        Err(_) => Ok(default),
    }
}
