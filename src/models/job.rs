use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// État d'un job d'entraînement
///
/// L'ordre est monotone: {queued, processing} -> {succeeded | failed}.
/// Un état terminal n'est plus jamais quitté.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Queued,       // Accepté par le fournisseur, en attente
    Processing,   // Entraînement en cours chez le fournisseur
    Succeeded,    // Terminé, model_reference disponible
    Failed,       // Échec, error_detail renseigné
}

impl TrainingStatus {
    /// Un état terminal ne peut plus être modifié
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrainingStatus::Succeeded | TrainingStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingStatus::Queued => "queued",
            TrainingStatus::Processing => "processing",
            TrainingStatus::Succeeded => "succeeded",
            TrainingStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TrainingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Un job d'entraînement de modèle personnalisé
///
/// L'identifiant est celui attribué par le fournisseur externe, ce qui permet
/// de réconcilier directement les webhooks et les polls avec la ligne locale.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrainingJob {
    /// ID du job chez le fournisseur externe
    pub id: String,

    /// ID de l'utilisateur propriétaire
    pub user_id: Uuid,

    /// Descripteur du sujet (ex: "homme", "femme", "chien"), utilisé pour
    /// paramétrer les prompts de génération
    pub subject: String,

    /// État actuel du job
    pub status: TrainingStatus,

    /// Référence du modèle entraîné (présente uniquement si succeeded)
    pub model_reference: Option<String>,

    /// Détail de l'erreur (présent uniquement si failed)
    pub error_detail: Option<String>,

    /// Nom du modèle de destination chez le fournisseur, dérivé de façon
    /// déterministe de l'utilisateur et de l'horodatage de soumission
    pub destination: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrainingJob {
    pub fn new(
        id: String,
        user_id: Uuid,
        subject: String,
        status: TrainingStatus,
        destination: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            subject,
            status,
            model_reference: None,
            error_detail: None,
            destination,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
