use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{TrainingJob, TrainingStatus};
use crate::utils::error::{AppError, Result};

/// Repository pour les jobs d'entraînement
///
/// Toutes les transitions d'état passent par des UPDATE conditionnels
/// (`WHERE status IN ('queued','processing')`): le nombre de lignes affectées
/// indique si la transition a eu lieu, ce qui tient lieu de verrou face aux
/// livraisons webhook dupliquées et aux polls concurrents, y compris entre
/// plusieurs instances du processus.
#[derive(Debug, Clone)]
pub struct JobsRepository {
    pool: SqlitePool,
}

impl JobsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persiste un nouveau job, identifié par l'ID du fournisseur externe
    pub async fn create(&self, job: &TrainingJob) -> Result<TrainingJob> {
        sqlx::query(
            r#"
            INSERT INTO training_jobs (
                id, user_id, subject, status, model_reference,
                error_detail, destination, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(job.user_id)
        .bind(&job.subject)
        .bind(job.status)
        .bind(&job.model_reference)
        .bind(&job.error_detail)
        .bind(&job.destination)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(job.clone())
    }

    /// Récupère un job par son ID fournisseur
    pub async fn get_by_id(&self, job_id: &str) -> Result<TrainingJob> {
        let job = sqlx::query_as::<_, TrainingJob>(
            r#"
            SELECT id, user_id, subject, status, model_reference,
                   error_detail, destination, created_at, updated_at
            FROM training_jobs
            WHERE id = ?
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::JobNotFound)?;

        Ok(job)
    }

    /// Liste les jobs d'un utilisateur, du plus récent au plus ancien
    pub async fn get_by_user(&self, user_id: &Uuid, limit: i64) -> Result<Vec<TrainingJob>> {
        let jobs = sqlx::query_as::<_, TrainingJob>(
            r#"
            SELECT id, user_id, subject, status, model_reference,
                   error_detail, destination, created_at, updated_at
            FROM training_jobs
            WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    /// Avance un job vers un état non terminal (queued -> processing)
    ///
    /// # Retourne
    /// * Le nombre de lignes affectées (0 si le job était déjà terminal)
    pub async fn advance_non_terminal(
        &self,
        job_id: &str,
        status: TrainingStatus,
    ) -> Result<u64> {
        debug_assert!(!status.is_terminal());

        let result = sqlx::query(
            r#"
            UPDATE training_jobs
            SET status = ?, updated_at = ?
            WHERE id = ? AND status IN ('queued', 'processing')
            "#,
        )
        .bind(status)
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Transition atomique vers `succeeded`
    ///
    /// Une seule exécution peut affecter une ligne: c'est la garantie
    /// "fan-out exactement une fois" face à un webhook et un poll concurrents.
    ///
    /// # Retourne
    /// * `1` si cette exécution a réalisé la première transition, `0` sinon
    pub async fn complete(&self, job_id: &str, model_reference: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE training_jobs
            SET status = 'succeeded', model_reference = ?, updated_at = ?
            WHERE id = ? AND status IN ('queued', 'processing')
            "#,
        )
        .bind(model_reference)
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Transition atomique vers `failed`
    pub async fn fail(&self, job_id: &str, error_detail: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE training_jobs
            SET status = 'failed', error_detail = ?, updated_at = ?
            WHERE id = ? AND status IN ('queued', 'processing')
            "#,
        )
        .bind(error_detail)
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
