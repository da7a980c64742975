// utils/error.rs
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // Erreurs d'authentification
    #[error("Authentication failed")]
    Unauthorized,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    // Erreurs de données
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    // Erreurs de ressources
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Training job not found")]
    JobNotFound,

    // Erreurs d'orchestration
    #[error("No assets uploaded for this session")]
    NoAssets,

    #[error("Training is not ready: current status is {0}")]
    TrainingNotReady(String),

    #[error("Completed training reported no usable model reference")]
    IncompleteCompletion,

    #[error("Anomalous status transition: {0}")]
    AnomalousTransition(String),

    // Erreurs de quota
    #[error("Generation quota exceeded: {reason}")]
    QuotaExceeded { reason: String, remaining: i64 },

    // Erreurs externes
    #[error("Training submission failed: {0}")]
    ExternalSubmission(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    // Erreurs de base de données
    #[error("Database error: {0}")]
    Database(String),

    // Erreurs de stockage
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            // 400 - Bad Request
            AppError::Validation(_) | AppError::ParseError(_) => {
                HttpResponse::BadRequest().json(json!({
                    "error": self.to_string(),
                    "code": "BAD_REQUEST"
                }))
            }

            // 401 - Unauthorized
            AppError::Unauthorized
            | AppError::InvalidToken
            | AppError::InvalidSignature => {
                HttpResponse::Unauthorized().json(json!({
                    "error": self.to_string(),
                    "code": "UNAUTHORIZED"
                }))
            }

            // 403 - Quota épuisé, avec la raison et le solde restant
            AppError::QuotaExceeded { reason, remaining } => {
                HttpResponse::Forbidden().json(json!({
                    "error": self.to_string(),
                    "code": "QUOTA_EXCEEDED",
                    "reason": reason,
                    "remaining": remaining
                }))
            }

            // 404 - Not Found
            AppError::NotFound(_) | AppError::JobNotFound => {
                HttpResponse::NotFound().json(json!({
                    "error": self.to_string(),
                    "code": "NOT_FOUND"
                }))
            }

            // 409 - Conflict
            AppError::TrainingNotReady(status) => {
                HttpResponse::Conflict().json(json!({
                    "error": self.to_string(),
                    "code": "TRAINING_NOT_READY",
                    "status": status
                }))
            }

            AppError::AnomalousTransition(_) => {
                HttpResponse::Conflict().json(json!({
                    "error": self.to_string(),
                    "code": "ANOMALOUS_TRANSITION"
                }))
            }

            // 412 - Precondition Failed
            AppError::NoAssets => {
                HttpResponse::PreconditionFailed().json(json!({
                    "error": self.to_string(),
                    "code": "NO_ASSETS"
                }))
            }

            // 502 - Bad Gateway (erreurs du fournisseur externe, réessayables)
            AppError::ExternalSubmission(_)
            | AppError::ExternalService(_)
            | AppError::IncompleteCompletion => {
                HttpResponse::BadGateway().json(json!({
                    "error": self.to_string(),
                    "code": "EXTERNAL_ERROR",
                    "retryable": true
                }))
            }

            // 500 - Internal Server Error
            _ => {
                tracing::error!("Internal server error: {}", self);
                HttpResponse::InternalServerError().json(json!({
                    "error": "Internal server error",
                    "code": "INTERNAL_ERROR"
                }))
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializeError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::StorageError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalService(err.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = err
            .field_errors()
            .iter()
            .map(|(field, errors)| {
                let error_messages: Vec<String> = errors
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect();

        AppError::Validation(messages.join("; "))
    }
}

// Type de résultat standard
pub type Result<T> = std::result::Result<T, AppError>;
