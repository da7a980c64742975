use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{PlanName, Subscription, SubscriptionStatus};
use crate::utils::error::Result;

/// Repository pour les abonnements
///
/// La consommation et le rollover du compteur d'usage sont des UPDATE
/// conditionnels mono-ligne: aucune arithmétique de quota n'est faite en
/// mémoire applicative entre deux allers-retours.
#[derive(Debug, Clone)]
pub struct SubscriptionsRepository {
    pool: SqlitePool,
}

impl SubscriptionsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Récupère l'abonnement d'un utilisateur (au plus une ligne par utilisateur)
    pub async fn get_by_user(&self, user_id: &Uuid) -> Result<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, user_id, plan_name, status, monthly_generations,
                   generations_used, current_period_start, current_period_end,
                   last_reset_date, cancel_at_period_end,
                   provider_customer_id, provider_subscription_id,
                   created_at, updated_at
            FROM subscriptions
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscription)
    }

    /// Applique le rollover de période s'il est dû
    ///
    /// Condition: `now >= current_period_start` et
    /// `last_reset_date < current_period_start`. Le compteur repasse à 0 et
    /// `last_reset_date` avance à `now`, avant toute décision de quota.
    ///
    /// # Retourne
    /// * Le nombre de lignes affectées (0 si aucun rollover n'était dû)
    pub async fn apply_rollover(&self, user_id: &Uuid, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET generations_used = 0, last_reset_date = ?, updated_at = ?
            WHERE user_id = ?
              AND ? >= current_period_start
              AND last_reset_date < current_period_start
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Consomme une génération si le plafond n'est pas atteint
    ///
    /// UPDATE conditionnel unique (incrément-si-sous-la-limite): deux
    /// requêtes concurrentes ne peuvent pas toutes deux consommer la
    /// dernière génération.
    ///
    /// # Retourne
    /// * `true` si la génération a été consommée, `false` si le plafond est atteint
    pub async fn consume_one(&self, user_id: &Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET generations_used = generations_used + 1, updated_at = ?
            WHERE user_id = ? AND generations_used < monthly_generations
            "#,
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Insère un abonnement complet (écrit par le collaborateur de
    /// facturation; également utilisé pour amorcer les tests)
    pub async fn seed(&self, subscription: &Subscription) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, plan_name, status, monthly_generations,
                generations_used, current_period_start, current_period_end,
                last_reset_date, cancel_at_period_end,
                provider_customer_id, provider_subscription_id,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.user_id)
        .bind(subscription.plan_name)
        .bind(subscription.status)
        .bind(subscription.monthly_generations)
        .bind(subscription.generations_used)
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.last_reset_date)
        .bind(subscription.cancel_at_period_end)
        .bind(&subscription.provider_customer_id)
        .bind(&subscription.provider_subscription_id)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Construit un abonnement actif démarrant maintenant, pour l'amorçage
pub fn new_active_subscription(user_id: Uuid, plan: PlanName) -> Subscription {
    let now = Utc::now();
    Subscription {
        id: Uuid::new_v4(),
        user_id,
        plan_name: plan,
        status: SubscriptionStatus::Active,
        monthly_generations: plan.generation_limit(),
        generations_used: 0,
        current_period_start: now,
        current_period_end: now + Duration::days(30),
        last_reset_date: now,
        cancel_at_period_end: false,
        provider_customer_id: None,
        provider_subscription_id: None,
        created_at: now,
        updated_at: now,
    }
}
