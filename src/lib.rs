// src/lib.rs
// Modules principaux
pub mod api;
pub mod core;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

pub use utils::error::{AppError, Result};

// Version de l'application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Outillage partagé des tests
#[cfg(test)]
pub mod test_utils {
    use crate::infrastructure::database::Database;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init_test_logging() {
        INIT.call_once(|| {
            tracing_subscriber::fmt().with_test_writer().init();
        });
    }

    /// Pool SQLite en mémoire avec le schéma créé
    ///
    /// Une seule connexion: chaque connexion `sqlite::memory:` ouvrirait sa
    /// propre base, et la sérialisation des accès n'enlève rien aux tests de
    /// concurrence puisque les invariants reposent sur des UPDATE
    /// conditionnels, pas sur l'entrelacement des connexions.
    pub async fn create_test_pool() -> SqlitePool {
        init_test_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Impossible d'ouvrir la base de test");

        Database::new_with_pool(pool.clone())
            .init_schema()
            .await
            .expect("Impossible de créer le schéma de test");

        pool
    }
}
