use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Une image générée, immuable après création
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GeneratedImage {
    pub id: Uuid,
    pub user_id: Uuid,

    /// Job d'entraînement à l'origine du modèle (null pour un modèle pré-entraîné)
    pub job_id: Option<String>,

    /// Prompt utilisé pour la génération
    pub prompt: String,

    /// Référence du modèle utilisé
    pub model_reference: String,

    /// Emplacement de l'image dans le stockage blob
    pub storage_path: String,

    pub created_at: DateTime<Utc>,
}

impl GeneratedImage {
    pub fn new(
        user_id: Uuid,
        job_id: Option<String>,
        prompt: String,
        model_reference: String,
        storage_path: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            job_id,
            prompt,
            model_reference,
            storage_path,
            created_at: Utc::now(),
        }
    }
}
