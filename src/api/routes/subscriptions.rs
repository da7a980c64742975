use actix_web::{get, web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::core::auth::get_current_user;
use crate::core::quota_service::QuotaService;
use crate::infrastructure::database::{Database, SubscriptionsRepository, UsersRepository};
use crate::utils::config::Config;
use crate::utils::error::Result;

/// Vue d'usage: la décision d'accès courante et l'état de l'abonnement
#[get("/subscriptions/usage")]
pub async fn get_usage(
    req: HttpRequest,
    db: web::Data<Database>,
    config: web::Data<Config>,
) -> Result<HttpResponse> {
    let users_repo = UsersRepository::new(db.pool.clone());
    let user = get_current_user(&req, &config.jwt_secret, &users_repo).await?;

    let subscriptions_repo = SubscriptionsRepository::new(db.pool.clone());
    let quota = QuotaService::new(
        subscriptions_repo.clone(),
        users_repo,
        config.free_lifetime_generations,
    );

    let decision = quota.check_access(&user.id).await?;
    let subscription = subscriptions_repo.get_by_user(&user.id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "access": decision,
        "subscription": subscription.map(|s| json!({
            "plan_name": s.plan_name,
            "status": s.status,
            "monthly_generations": s.monthly_generations,
            "generations_used": s.generations_used,
            "current_period_end": s.current_period_end,
            "cancel_at_period_end": s.cancel_at_period_end
        }))
    })))
}
