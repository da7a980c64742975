use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::User;
use crate::utils::error::Result;

/// Repository pour les utilisateurs
///
/// Les lignes sont créées paresseusement à partir de l'identité portée par le
/// token d'accès (l'émission des comptes est hors périmètre). La ligne locale
/// sert de support au compteur de générations gratuites à vie.
#[derive(Debug, Clone)]
pub struct UsersRepository {
    pool: SqlitePool,
}

impl UsersRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Garantit l'existence de la ligne utilisateur. Idempotent.
    pub async fn ensure(&self, user_id: &Uuid, email: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO users (id, email, free_generations_used, created_at)
            VALUES (?, ?, 0, ?)
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, user_id: &Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, free_generations_used, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Consomme une génération gratuite si le plafond à vie n'est pas atteint
    ///
    /// # Retourne
    /// * `true` si la génération a été consommée
    pub async fn consume_free_generation(&self, user_id: &Uuid, ceiling: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET free_generations_used = free_generations_used + 1
            WHERE id = ? AND free_generations_used < ?
            "#,
        )
        .bind(user_id)
        .bind(ceiling)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
