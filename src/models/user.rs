use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Un utilisateur de la plateforme
///
/// L'émission des sessions est gérée par un collaborateur hors périmètre; la
/// ligne locale porte uniquement le compteur de générations gratuites sur
/// modèles pré-entraînés (plafond fixe, jamais réinitialisé).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,

    /// Générations gratuites consommées (compteur à vie)
    pub free_generations_used: i64,

    pub created_at: DateTime<Utc>,
}
