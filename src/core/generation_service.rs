// core/generation_service.rs
//
// Génération d'images: lot de démarrage après un entraînement réussi, et
// génération à la demande sur modèle entraîné (quota d'abonnement) ou
// pré-entraîné (compteur gratuit à vie).

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::core::quota_service::QuotaService;
use crate::infrastructure::database::{ImagesRepository, JobsRepository};
use crate::infrastructure::storage::StorageService;
use crate::models::{GeneratedImage, TrainingJob, TrainingStatus};
use crate::services::providers::InferenceProvider;
use crate::utils::error::{AppError, Result};

/// Gabarits du lot de démarrage, paramétrés par le sujet du job
const STARTER_PROMPT_TEMPLATES: [&str; 6] = [
    "Portrait studio professionnel de {subject}, fond neutre, éclairage doux",
    "Portrait de {subject} en extérieur à l'heure dorée, arrière-plan flou",
    "Portrait en noir et blanc de {subject}, éclairage dramatique de profil",
    "Portrait de {subject} en tenue décontractée dans un café parisien",
    "Portrait artistique de {subject}, style peinture à l'huile",
    "Portrait corporate de {subject} en costume, arrière-plan de bureau",
];

/// Modèle ciblé par une génération à la demande
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSelector {
    /// Modèle personnalisé issu d'un entraînement de l'appelant
    Trained { job_id: String },
    /// Modèle du catalogue pré-entraîné
    Pretrained { name: String },
}

pub struct GenerationService {
    images: ImagesRepository,
    jobs: JobsRepository,
    quota: QuotaService,
    storage: Arc<StorageService>,
    inference: Arc<dyn InferenceProvider>,
    pretrained_models: Vec<String>,
    batch_width: usize,
    batch_pause: Duration,
}

impl GenerationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        images: ImagesRepository,
        jobs: JobsRepository,
        quota: QuotaService,
        storage: Arc<StorageService>,
        inference: Arc<dyn InferenceProvider>,
        pretrained_models: Vec<String>,
        batch_width: usize,
        batch_pause_ms: u64,
    ) -> Self {
        Self {
            images,
            jobs,
            quota,
            storage,
            inference,
            pretrained_models,
            batch_width: batch_width.max(1),
            batch_pause: Duration::from_millis(batch_pause_ms),
        }
    }

    /// Génère le lot de démarrage d'un job qui vient de réussir
    ///
    /// Exécution par tranches de `batch_width` avec une pause entre les
    /// tranches, pour ménager le fournisseur. Un prompt qui échoue est
    /// journalisé et sauté; le lot ne consomme jamais de quota.
    pub async fn generate_starter_batch(
        &self,
        job: &TrainingJob,
        model_reference: &str,
    ) -> Result<Vec<GeneratedImage>> {
        let prompts: Vec<String> = STARTER_PROMPT_TEMPLATES
            .iter()
            .map(|template| template.replace("{subject}", &job.subject))
            .collect();

        let mut generated = Vec::new();
        let mut chunks = prompts.chunks(self.batch_width).peekable();
        while let Some(chunk) = chunks.next() {
            let results = join_all(chunk.iter().map(|prompt| {
                self.render_and_store(&job.user_id, Some(&job.id), model_reference, prompt)
            }))
            .await;

            for (prompt, result) in chunk.iter().zip(results) {
                match result {
                    Ok(image) => generated.push(image),
                    Err(e) => {
                        tracing::warn!(
                            "⚠️  Prompt du lot de démarrage sauté (job {}): {} - {}",
                            job.id,
                            prompt,
                            e
                        );
                    }
                }
            }

            if chunks.peek().is_some() {
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        tracing::info!(
            "✅ Lot de démarrage du job {}: {}/{} images générées",
            job.id,
            generated.len(),
            prompts.len()
        );
        Ok(generated)
    }

    /// Génère une image à la demande, sous contrôle de quota
    pub async fn generate_on_demand(
        &self,
        user_id: &Uuid,
        prompt: &str,
        selector: ModelSelector,
    ) -> Result<GeneratedImage> {
        match selector {
            ModelSelector::Trained { job_id } => {
                let job = self.jobs.get_by_id(&job_id).await?;
                if job.user_id != *user_id {
                    return Err(AppError::JobNotFound);
                }
                let model_reference = match (&job.status, &job.model_reference) {
                    (TrainingStatus::Succeeded, Some(reference)) => reference.clone(),
                    _ => return Err(AppError::TrainingNotReady(job.status.as_str().to_string())),
                };

                let decision = self.quota.check_access(user_id).await?;
                if !decision.allowed {
                    return Err(AppError::QuotaExceeded {
                        reason: decision
                            .reason
                            .unwrap_or_else(|| "Accès refusé".to_string()),
                        remaining: decision.remaining,
                    });
                }
                if !self.quota.consume(user_id).await? {
                    return Err(AppError::QuotaExceeded {
                        reason: "Quota mensuel épuisé".to_string(),
                        remaining: 0,
                    });
                }

                self.render_and_store(user_id, Some(&job.id), &model_reference, prompt)
                    .await
            }

            ModelSelector::Pretrained { name } => {
                if !self.pretrained_models.iter().any(|m| m == &name) {
                    return Err(AppError::NotFound(format!(
                        "Modèle pré-entraîné inconnu: {}",
                        name
                    )));
                }
                if !self.quota.consume_free(user_id).await? {
                    return Err(AppError::QuotaExceeded {
                        reason: "Générations gratuites épuisées".to_string(),
                        remaining: 0,
                    });
                }

                self.render_and_store(user_id, None, &name, prompt).await
            }
        }
    }

    /// Liste les images de l'appelant, de la plus récente à la plus ancienne
    pub async fn list_images(&self, user_id: &Uuid) -> Result<Vec<GeneratedImage>> {
        self.images.list_by_user(user_id, 100).await
    }

    /// Inférence, dépôt dans le stockage blob, puis enregistrement
    async fn render_and_store(
        &self,
        user_id: &Uuid,
        job_id: Option<&str>,
        model_reference: &str,
        prompt: &str,
    ) -> Result<GeneratedImage> {
        let bytes = self.inference.generate(model_reference, prompt).await?;
        let storage_path = self.storage.store_generated_image(user_id, &bytes).await?;

        self.images
            .create(&GeneratedImage::new(
                *user_id,
                job_id.map(String::from),
                prompt.to_string(),
                model_reference.to_string(),
                storage_path,
            ))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::subscriptions::new_active_subscription;
    use crate::infrastructure::database::{SubscriptionsRepository, UsersRepository};
    use crate::models::PlanName;
    use crate::services::providers::fakes::FakeInferenceProvider;
    use crate::test_utils::create_test_pool;

    struct Harness {
        service: GenerationService,
        jobs: JobsRepository,
        subscriptions: SubscriptionsRepository,
        users: UsersRepository,
        inference: Arc<FakeInferenceProvider>,
    }

    fn harness(pool: sqlx::SqlitePool, inference: FakeInferenceProvider) -> Harness {
        let dir = std::env::temp_dir().join(format!("portrait-generation-{}", Uuid::new_v4()));
        let inference = Arc::new(inference);
        let quota = QuotaService::new(
            SubscriptionsRepository::new(pool.clone()),
            UsersRepository::new(pool.clone()),
            3,
        );

        Harness {
            service: GenerationService::new(
                ImagesRepository::new(pool.clone()),
                JobsRepository::new(pool.clone()),
                quota,
                Arc::new(StorageService::new_local(dir.to_str().unwrap())),
                inference.clone(),
                vec!["flux-schnell".to_string(), "sdxl".to_string()],
                2,
                0,
            ),
            jobs: JobsRepository::new(pool.clone()),
            subscriptions: SubscriptionsRepository::new(pool.clone()),
            users: UsersRepository::new(pool),
            inference,
        }
    }

    async fn seed_succeeded_job(h: &Harness, user_id: Uuid) -> TrainingJob {
        let job = TrainingJob::new(
            format!("train-{}", Uuid::new_v4()),
            user_id,
            "femme".to_string(),
            TrainingStatus::Queued,
            "portrait-platform/portrait-test".to_string(),
        );
        h.jobs.create(&job).await.unwrap();
        h.jobs
            .complete(&job.id, "portrait-platform/portrait-test:v1")
            .await
            .unwrap();
        h.jobs.get_by_id(&job.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_starter_batch_generates_all_prompts_without_quota() {
        let pool = create_test_pool().await;
        let h = harness(pool, FakeInferenceProvider::new());

        let alice = Uuid::new_v4();
        let sub = new_active_subscription(alice, PlanName::Free);
        h.subscriptions.seed(&sub).await.unwrap();
        let job = seed_succeeded_job(&h, alice).await;

        let images = h
            .service
            .generate_starter_batch(&job, job.model_reference.as_deref().unwrap())
            .await
            .unwrap();

        assert_eq!(images.len(), STARTER_PROMPT_TEMPLATES.len());
        assert_eq!(h.inference.call_count(), STARTER_PROMPT_TEMPLATES.len());
        assert!(images.iter().all(|i| i.job_id.as_deref() == Some(job.id.as_str())));
        // Le sujet du job paramètre les prompts
        assert!(images.iter().all(|i| i.prompt.contains("femme")));

        // Le lot de démarrage ne touche pas au quota
        let after = h.subscriptions.get_by_user(&alice).await.unwrap().unwrap();
        assert_eq!(after.generations_used, 0);
    }

    #[tokio::test]
    async fn test_starter_batch_skips_failed_prompts() {
        let pool = create_test_pool().await;
        // Un seul gabarit contient "profil": il échoue, les autres passent
        let h = harness(pool, FakeInferenceProvider::failing_on("profil"));

        let alice = Uuid::new_v4();
        let job = seed_succeeded_job(&h, alice).await;

        let images = h
            .service
            .generate_starter_batch(&job, "portrait-platform/portrait-test:v1")
            .await
            .unwrap();

        assert_eq!(images.len(), STARTER_PROMPT_TEMPLATES.len() - 1);
        assert!(images.iter().all(|i| !i.prompt.contains("profil")));
    }

    #[tokio::test]
    async fn test_on_demand_requires_succeeded_job() {
        let pool = create_test_pool().await;
        let h = harness(pool, FakeInferenceProvider::new());

        let alice = Uuid::new_v4();
        let job = TrainingJob::new(
            "train-pending".to_string(),
            alice,
            "homme".to_string(),
            TrainingStatus::Processing,
            "portrait-platform/portrait-test".to_string(),
        );
        h.jobs.create(&job).await.unwrap();

        let result = h
            .service
            .generate_on_demand(
                &alice,
                "portrait au bord de mer",
                ModelSelector::Trained {
                    job_id: "train-pending".to_string(),
                },
            )
            .await;

        match result {
            Err(AppError::TrainingNotReady(status)) => assert_eq!(status, "processing"),
            other => panic!("TrainingNotReady attendu, obtenu {:?}", other.map(|i| i.id)),
        }
    }

    #[tokio::test]
    async fn test_on_demand_is_owner_scoped() {
        let pool = create_test_pool().await;
        let h = harness(pool, FakeInferenceProvider::new());

        let alice = Uuid::new_v4();
        let job = seed_succeeded_job(&h, alice).await;

        let result = h
            .service
            .generate_on_demand(
                &Uuid::new_v4(),
                "portrait",
                ModelSelector::Trained { job_id: job.id },
            )
            .await;
        assert!(matches!(result, Err(AppError::JobNotFound)));
    }

    #[tokio::test]
    async fn test_on_demand_consumes_quota_and_denies_when_exhausted() {
        let pool = create_test_pool().await;
        let h = harness(pool, FakeInferenceProvider::new());

        let alice = Uuid::new_v4();
        let mut sub = new_active_subscription(alice, PlanName::Free);
        sub.generations_used = 9;
        h.subscriptions.seed(&sub).await.unwrap();
        let job = seed_succeeded_job(&h, alice).await;

        // Dernière génération de la période
        h.service
            .generate_on_demand(
                &alice,
                "portrait en forêt",
                ModelSelector::Trained {
                    job_id: job.id.clone(),
                },
            )
            .await
            .unwrap();

        let denied = h
            .service
            .generate_on_demand(
                &alice,
                "portrait en ville",
                ModelSelector::Trained { job_id: job.id },
            )
            .await;
        match denied {
            Err(AppError::QuotaExceeded { remaining, .. }) => assert_eq!(remaining, 0),
            other => panic!("QuotaExceeded attendu, obtenu {:?}", other.map(|i| i.id)),
        }

        // Le refus n'a pas déclenché d'inférence
        assert_eq!(h.inference.call_count(), 1);
    }

    #[tokio::test]
    async fn test_pretrained_uses_lifetime_free_counter() {
        let pool = create_test_pool().await;
        let h = harness(pool, FakeInferenceProvider::new());

        let alice = Uuid::new_v4();
        h.users.ensure(&alice, "alice@example.test").await.unwrap();

        for i in 0..3 {
            let image = h
                .service
                .generate_on_demand(
                    &alice,
                    &format!("portrait {}", i),
                    ModelSelector::Pretrained {
                        name: "flux-schnell".to_string(),
                    },
                )
                .await
                .unwrap();
            assert!(image.job_id.is_none());
        }

        let denied = h
            .service
            .generate_on_demand(
                &alice,
                "portrait 4",
                ModelSelector::Pretrained {
                    name: "flux-schnell".to_string(),
                },
            )
            .await;
        assert!(matches!(denied, Err(AppError::QuotaExceeded { .. })));
    }

    #[tokio::test]
    async fn test_pretrained_unknown_model_is_not_found() {
        let pool = create_test_pool().await;
        let h = harness(pool, FakeInferenceProvider::new());

        let alice = Uuid::new_v4();
        h.users.ensure(&alice, "alice@example.test").await.unwrap();

        let result = h
            .service
            .generate_on_demand(
                &alice,
                "portrait",
                ModelSelector::Pretrained {
                    name: "midjourney".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
