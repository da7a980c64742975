use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::GeneratedImage;
use crate::utils::error::Result;

/// Repository pour les images générées
#[derive(Debug, Clone)]
pub struct ImagesRepository {
    pool: SqlitePool,
}

impl ImagesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, image: &GeneratedImage) -> Result<GeneratedImage> {
        sqlx::query(
            r#"
            INSERT INTO generated_images (
                id, user_id, job_id, prompt, model_reference, storage_path, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(image.id)
        .bind(image.user_id)
        .bind(&image.job_id)
        .bind(&image.prompt)
        .bind(&image.model_reference)
        .bind(&image.storage_path)
        .bind(image.created_at)
        .execute(&self.pool)
        .await?;

        Ok(image.clone())
    }

    pub async fn list_by_user(&self, user_id: &Uuid, limit: i64) -> Result<Vec<GeneratedImage>> {
        let images = sqlx::query_as::<_, GeneratedImage>(
            r#"
            SELECT id, user_id, job_id, prompt, model_reference, storage_path, created_at
            FROM generated_images
            WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(images)
    }

    pub async fn list_by_job(&self, job_id: &str) -> Result<Vec<GeneratedImage>> {
        let images = sqlx::query_as::<_, GeneratedImage>(
            r#"
            SELECT id, user_id, job_id, prompt, model_reference, storage_path, created_at
            FROM generated_images
            WHERE job_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(images)
    }
}
