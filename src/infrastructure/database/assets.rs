use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{AssetStatus, UploadedAsset};
use crate::utils::error::Result;

/// Repository pour les photos uploadées
#[derive(Debug, Clone)]
pub struct AssetsRepository {
    pool: SqlitePool,
}

impl AssetsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Enregistre une photo uploadée
    pub async fn create(&self, asset: &UploadedAsset) -> Result<UploadedAsset> {
        sqlx::query(
            r#"
            INSERT INTO uploaded_assets (
                id, user_id, session_id, job_id, storage_path,
                content_type, size_bytes, status, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(asset.id)
        .bind(asset.user_id)
        .bind(&asset.session_id)
        .bind(&asset.job_id)
        .bind(&asset.storage_path)
        .bind(&asset.content_type)
        .bind(asset.size_bytes)
        .bind(asset.status)
        .bind(asset.created_at)
        .execute(&self.pool)
        .await?;

        Ok(asset.clone())
    }

    /// Récupère toutes les photos d'une session, tous propriétaires confondus
    ///
    /// Le filtre `session_id = ?` exclut structurellement les photos sans
    /// session (session NULL ne matche jamais).
    pub async fn list_by_session(&self, session_id: &str) -> Result<Vec<UploadedAsset>> {
        let assets = sqlx::query_as::<_, UploadedAsset>(
            r#"
            SELECT id, user_id, session_id, job_id, storage_path,
                   content_type, size_bytes, status, created_at
            FROM uploaded_assets
            WHERE session_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(assets)
    }

    /// Récupère les photos d'une session non encore liées à un job
    pub async fn list_unlinked_session(
        &self,
        user_id: &Uuid,
        session_id: &str,
    ) -> Result<Vec<UploadedAsset>> {
        let assets = sqlx::query_as::<_, UploadedAsset>(
            r#"
            SELECT id, user_id, session_id, job_id, storage_path,
                   content_type, size_bytes, status, created_at
            FROM uploaded_assets
            WHERE session_id = ? AND user_id = ? AND job_id IS NULL
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(assets)
    }

    /// La session contient-elle déjà des photos liées à un job ?
    ///
    /// Une session consommée par une soumission de training est close:
    /// aucun ajout ultérieur n'est accepté.
    pub async fn session_is_linked(&self, user_id: &Uuid, session_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM uploaded_assets
            WHERE session_id = ? AND user_id = ? AND job_id IS NOT NULL
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Lie en une passe toutes les photos non liées d'une session au job donné
    ///
    /// Le filtre `job_id IS NULL` rend l'opération idempotente face aux
    /// retries de soumission: une photo déjà liée n'est jamais réassignée.
    ///
    /// # Retourne
    /// * Le nombre de photos liées par cette passe
    pub async fn link_session_to_job(
        &self,
        user_id: &Uuid,
        session_id: &str,
        job_id: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE uploaded_assets
            SET job_id = ?, status = ?
            WHERE session_id = ? AND user_id = ? AND job_id IS NULL
            "#,
        )
        .bind(job_id)
        .bind(AssetStatus::Processed)
        .bind(session_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Insère une photo héritée sans session (outillage de tests)
    #[cfg(test)]
    pub async fn create_unscoped(&self, user_id: &Uuid, storage_path: &str) -> Result<Uuid> {
        use chrono::Utc;

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO uploaded_assets (
                id, user_id, session_id, job_id, storage_path,
                content_type, size_bytes, status, created_at
            )
            VALUES (?, ?, NULL, NULL, ?, 'image/jpeg', 0, ?, ?)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(storage_path)
        .bind(AssetStatus::Received)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }
}
