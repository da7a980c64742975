use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// État de traitement d'une photo uploadée
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Received,     // Upload terminé, métadonnées enregistrées
    Processed,    // Inclus dans un dataset d'entraînement
}

/// Une photo uploadée par un utilisateur
///
/// `session_id` regroupe les photos destinées à une même tentative
/// d'entraînement. Une photo sans session est un reliquat hors périmètre et
/// n'apparaît jamais dans les requêtes par session. `job_id` est posé une
/// seule fois lors de la soumission de l'entraînement, puis jamais modifié.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UploadedAsset {
    pub id: Uuid,

    /// ID de l'utilisateur propriétaire
    pub user_id: Uuid,

    /// Session d'upload (null = photo héritée, hors session)
    pub session_id: Option<String>,

    /// Job d'entraînement lié (null tant qu'aucune soumission n'a eu lieu)
    pub job_id: Option<String>,

    /// Emplacement dans le stockage blob
    pub storage_path: String,

    pub content_type: String,
    pub size_bytes: i64,
    pub status: AssetStatus,
    pub created_at: DateTime<Utc>,
}

impl UploadedAsset {
    pub fn new(
        user_id: Uuid,
        session_id: String,
        storage_path: String,
        content_type: String,
        size_bytes: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            session_id: Some(session_id),
            job_id: None,
            storage_path,
            content_type,
            size_bytes,
            status: AssetStatus::Received,
            created_at: Utc::now(),
        }
    }
}
