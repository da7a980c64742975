//! Accès base de données
//!
//! Le schéma est créé de façon idempotente au démarrage (`CREATE TABLE IF
//! NOT EXISTS`). Les deux champs chauds — `training_jobs.status` et
//! `subscriptions.generations_used` — ne sont mutés que par des UPDATE
//! conditionnels mono-ligne, jamais par lecture-modification-écriture
//! applicative.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use crate::utils::error::Result;

pub mod assets;
pub mod images;
pub mod jobs;
pub mod subscriptions;
pub mod users;

pub use assets::AssetsRepository;
pub use images::ImagesRepository;
pub use jobs::JobsRepository;
pub use subscriptions::SubscriptionsRepository;
pub use users::UsersRepository;

#[derive(Debug, Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    /// Ouvre la base et crée le schéma si nécessaire
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;

        info!("✅ Base de données prête: {}", database_url);
        Ok(db)
    }

    /// Construit une instance à partir d'un pool existant (tests)
    pub fn new_with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Crée les tables et les pragmas. Idempotent.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&self.pool)
            .await?;

        create_users_table(&self.pool).await?;
        create_training_jobs_table(&self.pool).await?;
        create_uploaded_assets_table(&self.pool).await?;
        create_subscriptions_table(&self.pool).await?;
        create_generated_images_table(&self.pool).await?;

        Ok(())
    }
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id BLOB PRIMARY KEY,
            email TEXT NOT NULL DEFAULT '',
            free_generations_used INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_training_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS training_jobs (
            id TEXT PRIMARY KEY,
            user_id BLOB NOT NULL,
            subject TEXT NOT NULL,
            status TEXT NOT NULL,
            model_reference TEXT,
            error_detail TEXT,
            destination TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_training_jobs_user ON training_jobs(user_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_uploaded_assets_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS uploaded_assets (
            id BLOB PRIMARY KEY,
            user_id BLOB NOT NULL,
            session_id TEXT,
            job_id TEXT REFERENCES training_jobs(id),
            storage_path TEXT NOT NULL,
            content_type TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_uploaded_assets_session ON uploaded_assets(session_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_subscriptions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscriptions (
            id BLOB PRIMARY KEY,
            user_id BLOB NOT NULL UNIQUE,
            plan_name TEXT NOT NULL,
            status TEXT NOT NULL,
            monthly_generations INTEGER NOT NULL,
            generations_used INTEGER NOT NULL DEFAULT 0,
            current_period_start TEXT NOT NULL,
            current_period_end TEXT NOT NULL,
            last_reset_date TEXT NOT NULL,
            cancel_at_period_end INTEGER NOT NULL DEFAULT 0,
            provider_customer_id TEXT,
            provider_subscription_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_generated_images_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS generated_images (
            id BLOB PRIMARY KEY,
            user_id BLOB NOT NULL,
            job_id TEXT REFERENCES training_jobs(id),
            prompt TEXT NOT NULL,
            model_reference TEXT NOT NULL,
            storage_path TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_generated_images_user ON generated_images(user_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}
