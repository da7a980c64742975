use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Plans d'abonnement disponibles
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanName {
    Free,
    Starter,
    Pro,
}

impl PlanName {
    /// Nombre de générations incluses par période de facturation
    pub fn generation_limit(&self) -> i64 {
        match self {
            PlanName::Free => 10,
            PlanName::Starter => 50,
            PlanName::Pro => 500,
        }
    }

    /// Prix mensuel en EUR
    pub fn monthly_price(&self) -> f64 {
        match self {
            PlanName::Free => 0.0,
            PlanName::Starter => 19.0,
            PlanName::Pro => 49.0,
        }
    }

    /// Description marketing du plan
    pub fn description(&self) -> &'static str {
        match self {
            PlanName::Free => "10 générations par mois",
            PlanName::Starter => "50 générations par mois + 1 modèle personnalisé",
            PlanName::Pro => "500 générations par mois + modèles personnalisés illimités",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanName::Free => "free",
            PlanName::Starter => "starter",
            PlanName::Pro => "pro",
        }
    }
}

/// État d'un abonnement, aligné sur les statuts du processeur de paiement
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
    Incomplete,
}

/// Abonnement d'un utilisateur (au plus une ligne par utilisateur)
///
/// La limite de générations est dénormalisée dans la ligne pour permettre
/// la consommation par UPDATE conditionnel mono-ligne.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_name: PlanName,
    pub status: SubscriptionStatus,

    /// Limite de générations pour la période courante
    pub monthly_generations: i64,

    /// Générations consommées depuis le dernier reset
    pub generations_used: i64,

    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,

    /// Date du dernier reset du compteur. Si elle précède
    /// `current_period_start`, un rollover est dû avant toute décision.
    pub last_reset_date: DateTime<Utc>,

    pub cancel_at_period_end: bool,

    /// Identifiants posés par le collaborateur de facturation (hors périmètre)
    pub provider_customer_id: Option<String>,
    pub provider_subscription_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Générations restantes sur la période courante
    pub fn remaining(&self) -> i64 {
        (self.monthly_generations - self.generations_used).max(0)
    }

    /// Un rollover de période est-il dû à l'instant `now` ?
    pub fn is_rollover_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.current_period_start && self.last_reset_date < self.current_period_start
    }
}
