//! Interfaces des fournisseurs externes d'entraînement et d'inférence
//!
//! Le cœur ne dépend que de ces traits; l'adaptateur HTTP les implémente et
//! les tests injectent des fakes déterministes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::TrainingStatus;
use crate::utils::error::{AppError, Result};

/// Paramètres d'une soumission d'entraînement
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSubmission {
    /// Modèle de destination (`owner/name`), créé au préalable
    pub destination: String,

    /// Emplacement du manifeste du dataset empaqueté
    pub manifest_url: String,

    /// Descripteur du sujet, transmis comme paramètre d'entraînement
    pub subject: String,

    /// URL de callback enregistrée pour les livraisons webhook
    pub webhook_url: String,
}

/// Résultat d'une soumission acceptée
#[derive(Debug, Clone)]
pub struct SubmittedTraining {
    /// ID du job attribué par le fournisseur
    pub id: String,

    /// Statut initial rapporté par l'appel de soumission
    pub initial_status: TrainingStatus,
}

/// Statut rapporté par le fournisseur, décodé en ensemble fermé à la frontière
///
/// Tout payload qui ne se décode pas dans cet ensemble est rejeté avant
/// d'atteindre le réconciliateur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    Queued,
    Processing,
    Succeeded { model_reference: Option<String> },
    Failed { detail: String },
}

/// Sortie d'un entraînement telle que publiée par le fournisseur
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderOutput {
    /// Référence versionnée du modèle entraîné
    pub version: Option<String>,

    /// Emplacement des poids, utilisé à défaut de version
    pub weights: Option<String>,
}

impl ProviderOutput {
    /// Référence de modèle extraite du payload, par ordre de préférence
    pub fn model_reference(&self) -> Option<String> {
        self.version.clone().or_else(|| self.weights.clone())
    }
}

/// Décode un statut fournisseur en `StatusReport`
///
/// Les statuts transitoires du fournisseur (`starting`, `queued`) sont
/// repliés sur `Queued`; un statut inconnu est une erreur de validation.
pub fn parse_status_report(
    status: &str,
    output: Option<&ProviderOutput>,
    error: Option<&str>,
) -> Result<StatusReport> {
    match status {
        "queued" | "starting" => Ok(StatusReport::Queued),
        "processing" => Ok(StatusReport::Processing),
        "succeeded" => Ok(StatusReport::Succeeded {
            model_reference: output.and_then(|o| o.model_reference()),
        }),
        "failed" | "canceled" => Ok(StatusReport::Failed {
            detail: error.unwrap_or("Training failed without detail").to_string(),
        }),
        other => Err(AppError::Validation(format!(
            "Statut fournisseur inconnu: {}", other
        ))),
    }
}

/// Fournisseur d'entraînement externe
#[async_trait]
pub trait TrainingProvider: Send + Sync {
    /// Crée le modèle de destination. Une destination déjà existante est un
    /// succès, pas une erreur: c'est ce qui rend les retries de soumission
    /// idempotents.
    async fn create_destination(&self, destination: &str) -> Result<()>;

    /// Soumet un entraînement et retourne l'ID et le statut initial
    async fn submit_training(&self, submission: &TrainingSubmission) -> Result<SubmittedTraining>;

    /// Interroge le statut courant d'un job (chemin poll)
    async fn training_status(&self, job_id: &str) -> Result<StatusReport>;

    /// Dernière version publiée d'une destination, si elle existe
    async fn latest_version(&self, destination: &str) -> Result<Option<String>>;
}

/// Fournisseur d'inférence externe
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Génère une image et retourne ses octets
    async fn generate(&self, model_reference: &str, prompt: &str) -> Result<Vec<u8>>;
}
