// core/quota_service.rs
//
// Décisions d'accès aux générations. La lecture (`check_access`) explique la
// décision; la consommation (`consume`) est un UPDATE conditionnel mono-ligne
// dont le résultat fait seul foi. Le rollover de période est appliqué avant
// toute décision.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::infrastructure::database::{SubscriptionsRepository, UsersRepository};
use crate::models::SubscriptionStatus;
use crate::utils::error::Result;

/// Décision d'accès, exposée telle quelle par la vue d'usage
#[derive(Debug, Clone, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub remaining: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AccessDecision {
    fn denied(reason: &str) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reason: Some(reason.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct QuotaService {
    subscriptions: SubscriptionsRepository,
    users: UsersRepository,
    free_lifetime_generations: i64,
}

impl QuotaService {
    pub fn new(
        subscriptions: SubscriptionsRepository,
        users: UsersRepository,
        free_lifetime_generations: i64,
    ) -> Self {
        Self {
            subscriptions,
            users,
            free_lifetime_generations,
        }
    }

    /// Évalue l'accès de l'utilisateur aux générations sur modèle entraîné
    ///
    /// Ordre de décision: pas d'abonnement, abonnement inactif, période
    /// terminée, rollover dû, puis solde restant.
    pub async fn check_access(&self, user_id: &Uuid) -> Result<AccessDecision> {
        let now = Utc::now();

        let Some(subscription) = self.subscriptions.get_by_user(user_id).await? else {
            return Ok(AccessDecision::denied("Aucun abonnement"));
        };

        if subscription.status != SubscriptionStatus::Active {
            return Ok(AccessDecision::denied("Abonnement inactif"));
        }

        if now > subscription.current_period_end {
            return Ok(AccessDecision::denied("Période de facturation terminée"));
        }

        let subscription = if subscription.is_rollover_due(now) {
            self.subscriptions.apply_rollover(user_id, now).await?;
            self.subscriptions
                .get_by_user(user_id)
                .await?
                .unwrap_or(subscription)
        } else {
            subscription
        };

        let remaining = subscription.remaining();
        if remaining <= 0 {
            return Ok(AccessDecision {
                allowed: false,
                remaining: 0,
                reason: Some("Quota mensuel épuisé".to_string()),
            });
        }

        Ok(AccessDecision {
            allowed: true,
            remaining,
            reason: None,
        })
    }

    /// Consomme une génération de la période courante
    ///
    /// Le rollover est appliqué d'abord (UPDATE conditionnel, sans effet s'il
    /// n'est pas dû), puis l'incrément-si-sous-la-limite. `false` signifie que
    /// le plafond est atteint: l'appelant ne doit pas livrer la génération.
    pub async fn consume(&self, user_id: &Uuid) -> Result<bool> {
        self.subscriptions.apply_rollover(user_id, Utc::now()).await?;
        self.subscriptions.consume_one(user_id).await
    }

    /// Consomme une génération gratuite à vie (modèles pré-entraînés)
    pub async fn consume_free(&self, user_id: &Uuid) -> Result<bool> {
        self.users
            .consume_free_generation(user_id, self.free_lifetime_generations)
            .await
    }
}
