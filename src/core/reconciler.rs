// core/reconciler.rs
//
// Réconciliation des statuts rapportés par le fournisseur (webhook et poll)
// avec l'enregistrement local du job. Les livraisons sont au-mieux-une-fois
// côté fournisseur mais au-moins-une-fois côté réception: tout passe par les
// transitions conditionnelles du repository, jamais par un flag en mémoire.

use std::sync::Arc;
use uuid::Uuid;

use crate::core::generation_service::GenerationService;
use crate::infrastructure::database::JobsRepository;
use crate::models::{TrainingJob, TrainingStatus};
use crate::services::providers::{StatusReport, TrainingProvider};
use crate::utils::error::{AppError, Result};

/// Résultat d'une réconciliation
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub job: TrainingJob,
    /// `true` exactement une fois par job: cette application a réalisé la
    /// première transition vers `succeeded`
    pub fanout_due: bool,
}

#[derive(Clone)]
pub struct Reconciler {
    jobs: JobsRepository,
    provider: Arc<dyn TrainingProvider>,
    generation: Arc<GenerationService>,
}

impl Reconciler {
    pub fn new(
        jobs: JobsRepository,
        provider: Arc<dyn TrainingProvider>,
        generation: Arc<GenerationService>,
    ) -> Self {
        Self {
            jobs,
            provider,
            generation,
        }
    }

    /// Applique un rapport de statut à un job
    ///
    /// `fanout_due` vaut `true` si et seulement si cette application a réalisé
    /// la première transition vers `succeeded`: entre un webhook et un poll
    /// concurrents, un seul des deux le verra.
    pub async fn apply_status(
        &self,
        job_id: &str,
        report: StatusReport,
    ) -> Result<ReconcileOutcome> {
        let job = self.jobs.get_by_id(job_id).await?;

        match report {
            StatusReport::Queued | StatusReport::Processing => {
                if job.is_terminal() {
                    // Livraison en retard d'un statut intermédiaire: ignorée
                    tracing::debug!(
                        "Rapport non terminal ignoré pour le job terminal {} ({})",
                        job_id,
                        job.status
                    );
                    return Ok(ReconcileOutcome {
                        job,
                        fanout_due: false,
                    });
                }

                let status = match report {
                    StatusReport::Queued => TrainingStatus::Queued,
                    _ => TrainingStatus::Processing,
                };
                self.jobs.advance_non_terminal(job_id, status).await?;
                Ok(ReconcileOutcome {
                    job: self.jobs.get_by_id(job_id).await?,
                    fanout_due: false,
                })
            }

            StatusReport::Succeeded { model_reference } => {
                if job.is_terminal() {
                    return self.reconcile_terminal_success(job, model_reference.as_deref());
                }

                // Référence du payload, sinon dernière version publiée de la
                // destination. Sans référence exploitable, le job reste non
                // terminal et le fournisseur retentera la livraison.
                let reference = match model_reference {
                    Some(reference) => reference,
                    None => self
                        .provider
                        .latest_version(&job.destination)
                        .await?
                        .ok_or(AppError::IncompleteCompletion)?,
                };

                let rows = self.jobs.complete(job_id, &reference).await?;
                let current = self.jobs.get_by_id(job_id).await?;
                if rows == 1 {
                    tracing::info!("✅ Job {} réussi: modèle {}", job_id, reference);
                    return Ok(ReconcileOutcome {
                        job: current,
                        fanout_due: true,
                    });
                }

                // Perdu la course contre une application concurrente
                self.reconcile_terminal_success(current, Some(&reference))
            }

            StatusReport::Failed { detail } => {
                if job.is_terminal() {
                    return self.reconcile_terminal_failure(job);
                }

                let rows = self.jobs.fail(job_id, &detail).await?;
                let current = self.jobs.get_by_id(job_id).await?;
                if rows == 1 {
                    tracing::warn!("❌ Job {} échoué: {}", job_id, detail);
                    return Ok(ReconcileOutcome {
                        job: current,
                        fanout_due: false,
                    });
                }

                self.reconcile_terminal_failure(current)
            }
        }
    }

    /// Applique un rapport puis déclenche le lot de démarrage si cette
    /// application a réalisé la première transition vers `succeeded`
    ///
    /// Le lot part en tâche détachée: le handler déclencheur répond sans
    /// l'attendre, et un échec du lot ne touche pas au job déjà terminal.
    pub async fn apply_and_dispatch(
        &self,
        job_id: &str,
        report: StatusReport,
    ) -> Result<ReconcileOutcome> {
        let outcome = self.apply_status(job_id, report).await?;

        if outcome.fanout_due {
            let job = outcome.job.clone();
            let generation = self.generation.clone();
            tokio::spawn(async move {
                let Some(reference) = job.model_reference.clone() else {
                    return;
                };
                if let Err(e) = generation.generate_starter_batch(&job, &reference).await {
                    tracing::error!("❌ Lot de démarrage du job {} en échec: {}", job.id, e);
                }
            });
        }

        Ok(outcome)
    }

    /// Chemin poll: rafraîchit un job non terminal auprès du fournisseur
    ///
    /// Filet de sécurité pour les webhooks perdus. Une erreur de la requête
    /// de statut dégrade en lecture locale plutôt que de faire échouer le GET.
    pub async fn refresh_if_pending(&self, user_id: &Uuid, job: TrainingJob) -> Result<TrainingJob> {
        debug_assert_eq!(&job.user_id, user_id);

        if job.is_terminal() {
            return Ok(job);
        }

        let report = match self.provider.training_status(&job.id).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("⚠️  Statut du job {} inaccessible: {}", job.id, e);
                return Ok(job);
            }
        };

        let outcome = self.apply_and_dispatch(&job.id, report).await?;
        Ok(outcome.job)
    }

    fn reconcile_terminal_success(
        &self,
        current: TrainingJob,
        reference: Option<&str>,
    ) -> Result<ReconcileOutcome> {
        match current.status {
            TrainingStatus::Succeeded
                if reference.is_none() || current.model_reference.as_deref() == reference =>
            {
                // Duplicata d'une livraison déjà appliquée
                Ok(ReconcileOutcome {
                    job: current,
                    fanout_due: false,
                })
            }
            TrainingStatus::Succeeded => {
                tracing::error!(
                    "Job {}: référence contradictoire {:?} (stockée {:?})",
                    current.id,
                    reference,
                    current.model_reference
                );
                Err(AppError::AnomalousTransition(format!(
                    "le job {} est déjà réussi avec une autre référence",
                    current.id
                )))
            }
            _ => Err(AppError::AnomalousTransition(format!(
                "succeeded rapporté pour le job {} déjà en état {}",
                current.id, current.status
            ))),
        }
    }

    fn reconcile_terminal_failure(&self, current: TrainingJob) -> Result<ReconcileOutcome> {
        match current.status {
            TrainingStatus::Failed => Ok(ReconcileOutcome {
                job: current,
                fanout_due: false,
            }),
            _ => Err(AppError::AnomalousTransition(format!(
                "failed rapporté pour le job {} déjà en état {}",
                current.id, current.status
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::quota_service::QuotaService;
    use crate::infrastructure::database::{
        ImagesRepository, SubscriptionsRepository, UsersRepository,
    };
    use crate::infrastructure::storage::StorageService;
    use crate::services::providers::fakes::{FakeInferenceProvider, FakeTrainingProvider};
    use crate::test_utils::create_test_pool;
    use std::time::Duration;

    struct Harness {
        reconciler: Reconciler,
        jobs: JobsRepository,
        images: ImagesRepository,
        provider: Arc<FakeTrainingProvider>,
    }

    fn harness(pool: sqlx::SqlitePool) -> Harness {
        let dir = std::env::temp_dir().join(format!("portrait-reconcile-{}", Uuid::new_v4()));
        let provider = Arc::new(FakeTrainingProvider::new());
        let generation = Arc::new(GenerationService::new(
            ImagesRepository::new(pool.clone()),
            JobsRepository::new(pool.clone()),
            QuotaService::new(
                SubscriptionsRepository::new(pool.clone()),
                UsersRepository::new(pool.clone()),
                3,
            ),
            Arc::new(StorageService::new_local(dir.to_str().unwrap())),
            Arc::new(FakeInferenceProvider::new()),
            vec![],
            2,
            0,
        ));

        Harness {
            reconciler: Reconciler::new(
                JobsRepository::new(pool.clone()),
                provider.clone(),
                generation,
            ),
            jobs: JobsRepository::new(pool.clone()),
            images: ImagesRepository::new(pool),
            provider,
        }
    }

    async fn seed_job(h: &Harness, status: TrainingStatus) -> TrainingJob {
        let job = TrainingJob::new(
            format!("train-{}", Uuid::new_v4()),
            Uuid::new_v4(),
            "femme".to_string(),
            status,
            "portrait-platform/portrait-test".to_string(),
        );
        h.jobs.create(&job).await.unwrap()
    }

    fn succeeded(reference: &str) -> StatusReport {
        StatusReport::Succeeded {
            model_reference: Some(reference.to_string()),
        }
    }

    #[tokio::test]
    async fn test_duplicate_success_fans_out_exactly_once() {
        let pool = create_test_pool().await;
        let h = harness(pool);
        let job = seed_job(&h, TrainingStatus::Processing).await;

        let first = h
            .reconciler
            .apply_status(&job.id, succeeded("owner/m:v1"))
            .await
            .unwrap();
        assert!(first.fanout_due);
        assert_eq!(first.job.status, TrainingStatus::Succeeded);

        let second = h
            .reconciler
            .apply_status(&job.id, succeeded("owner/m:v1"))
            .await
            .unwrap();
        assert!(!second.fanout_due);
        assert_eq!(second.job.status, first.job.status);
        assert_eq!(second.job.model_reference, first.job.model_reference);
    }

    #[tokio::test]
    async fn test_concurrent_success_applications_race_to_one_fanout() {
        let pool = create_test_pool().await;
        let h = harness(pool);
        let job = seed_job(&h, TrainingStatus::Processing).await;

        // Webhook et poll appliquent le même rapport en parallèle
        let mut handles = Vec::new();
        for _ in 0..2 {
            let reconciler = h.reconciler.clone();
            let job_id = job.id.clone();
            handles.push(tokio::spawn(async move {
                reconciler.apply_status(&job_id, succeeded("owner/m:v1")).await
            }));
        }

        let mut fanouts = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().fanout_due {
                fanouts += 1;
            }
        }
        assert_eq!(fanouts, 1);
    }

    #[tokio::test]
    async fn test_conflicting_terminal_report_is_anomalous() {
        let pool = create_test_pool().await;
        let h = harness(pool);
        let job = seed_job(&h, TrainingStatus::Processing).await;

        h.reconciler
            .apply_status(
                &job.id,
                StatusReport::Failed {
                    detail: "out of memory".to_string(),
                },
            )
            .await
            .unwrap();

        // succeeded après failed: rejeté, l'enregistrement ne bouge pas
        let result = h
            .reconciler
            .apply_status(&job.id, succeeded("owner/m:v1"))
            .await;
        assert!(matches!(result, Err(AppError::AnomalousTransition(_))));

        let current = h.jobs.get_by_id(&job.id).await.unwrap();
        assert_eq!(current.status, TrainingStatus::Failed);
        assert_eq!(current.error_detail.as_deref(), Some("out of memory"));
    }

    #[tokio::test]
    async fn test_conflicting_model_reference_is_anomalous() {
        let pool = create_test_pool().await;
        let h = harness(pool);
        let job = seed_job(&h, TrainingStatus::Processing).await;

        h.reconciler
            .apply_status(&job.id, succeeded("owner/m:v1"))
            .await
            .unwrap();

        let result = h
            .reconciler
            .apply_status(&job.id, succeeded("owner/m:v2"))
            .await;
        assert!(matches!(result, Err(AppError::AnomalousTransition(_))));

        let current = h.jobs.get_by_id(&job.id).await.unwrap();
        assert_eq!(current.model_reference.as_deref(), Some("owner/m:v1"));
    }

    #[tokio::test]
    async fn test_stale_non_terminal_report_is_ignored() {
        let pool = create_test_pool().await;
        let h = harness(pool);
        let job = seed_job(&h, TrainingStatus::Processing).await;

        h.reconciler
            .apply_status(&job.id, succeeded("owner/m:v1"))
            .await
            .unwrap();

        let outcome = h
            .reconciler
            .apply_status(&job.id, StatusReport::Processing)
            .await
            .unwrap();
        assert!(!outcome.fanout_due);
        assert_eq!(outcome.job.status, TrainingStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_success_without_reference_falls_back_to_latest_version() {
        let pool = create_test_pool().await;
        let h = harness(pool);
        let job = seed_job(&h, TrainingStatus::Processing).await;
        h.provider
            .set_published_version(Some("portrait-platform/portrait-test:v7"));

        let outcome = h
            .reconciler
            .apply_status(
                &job.id,
                StatusReport::Succeeded {
                    model_reference: None,
                },
            )
            .await
            .unwrap();

        assert!(outcome.fanout_due);
        assert_eq!(
            outcome.job.model_reference.as_deref(),
            Some("portrait-platform/portrait-test:v7")
        );
    }

    #[tokio::test]
    async fn test_success_without_any_reference_leaves_job_pending() {
        let pool = create_test_pool().await;
        let h = harness(pool);
        let job = seed_job(&h, TrainingStatus::Processing).await;
        h.provider.set_published_version(None);

        let result = h
            .reconciler
            .apply_status(
                &job.id,
                StatusReport::Succeeded {
                    model_reference: None,
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::IncompleteCompletion)));

        // Ni faussement réussi, ni marqué échoué: le retry pourra aboutir
        let current = h.jobs.get_by_id(&job.id).await.unwrap();
        assert_eq!(current.status, TrainingStatus::Processing);
        assert!(current.model_reference.is_none());
    }

    #[tokio::test]
    async fn test_apply_and_dispatch_runs_starter_batch() {
        let pool = create_test_pool().await;
        let h = harness(pool);
        let job = seed_job(&h, TrainingStatus::Queued).await;

        let outcome = h
            .reconciler
            .apply_and_dispatch(&job.id, succeeded("owner/m:v1"))
            .await
            .unwrap();
        assert!(outcome.fanout_due);

        // Le lot part en tâche détachée: on attend son aboutissement
        let mut images = Vec::new();
        for _ in 0..100 {
            images = h.images.list_by_job(&job.id).await.unwrap();
            if images.len() >= 6 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(images.len(), 6);
        assert!(images.iter().all(|i| i.prompt.contains("femme")));

        // Le duplicata ne redéclenche rien
        let second = h
            .reconciler
            .apply_and_dispatch(&job.id, succeeded("owner/m:v1"))
            .await
            .unwrap();
        assert!(!second.fanout_due);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.images.list_by_job(&job.id).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_refresh_if_pending_polls_provider() {
        let pool = create_test_pool().await;
        let h = harness(pool);
        let job = seed_job(&h, TrainingStatus::Queued).await;
        h.provider.set_status(&job.id, StatusReport::Processing);

        let refreshed = h
            .reconciler
            .refresh_if_pending(&job.user_id, job.clone())
            .await
            .unwrap();
        assert_eq!(refreshed.status, TrainingStatus::Processing);
    }

    #[tokio::test]
    async fn test_refresh_of_terminal_job_does_not_query_provider() {
        let pool = create_test_pool().await;
        let h = harness(pool);
        let job = seed_job(&h, TrainingStatus::Processing).await;

        h.reconciler
            .apply_status(&job.id, succeeded("owner/m:v1"))
            .await
            .unwrap();
        let current = h.jobs.get_by_id(&job.id).await.unwrap();
        let owner = current.user_id;

        // Aucun statut programmé dans le fake: une requête échouerait
        let refreshed = h
            .reconciler
            .refresh_if_pending(&owner, current)
            .await
            .unwrap();
        assert_eq!(refreshed.status, TrainingStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_refresh_degrades_to_local_read_on_provider_error() {
        let pool = create_test_pool().await;
        let h = harness(pool);
        let job = seed_job(&h, TrainingStatus::Queued).await;
        let owner = job.user_id;

        // Le fake ne connaît pas ce job: training_status échoue
        let refreshed = h
            .reconciler
            .refresh_if_pending(&owner, job)
            .await
            .unwrap();
        assert_eq!(refreshed.status, TrainingStatus::Queued);
    }
}
