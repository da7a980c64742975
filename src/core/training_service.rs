// core/training_service.rs
//
// Orchestration du lancement d'un entraînement: assemblage du manifeste,
// création idempotente de la destination chez le fournisseur, soumission,
// persistance du job et liaison atomique des photos de la session.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::dataset_service::DatasetService;
use crate::infrastructure::database::{AssetsRepository, JobsRepository};
use crate::models::TrainingJob;
use crate::services::providers::{TrainingProvider, TrainingSubmission};
use crate::utils::error::{AppError, Result};

pub struct TrainingService {
    jobs: JobsRepository,
    assets: AssetsRepository,
    dataset: DatasetService,
    provider: Arc<dyn TrainingProvider>,
    model_owner: String,
    webhook_url: String,
}

impl TrainingService {
    pub fn new(
        jobs: JobsRepository,
        assets: AssetsRepository,
        dataset: DatasetService,
        provider: Arc<dyn TrainingProvider>,
        model_owner: &str,
        webhook_url: &str,
    ) -> Self {
        Self {
            jobs,
            assets,
            dataset,
            provider,
            model_owner: model_owner.to_string(),
            webhook_url: webhook_url.to_string(),
        }
    }

    /// Lance un entraînement sur les photos non encore liées de la session
    ///
    /// La liaison photos → job est une passe UPDATE unique conditionnée par
    /// `job_id IS NULL`: un second lancement sur la même session ne trouve
    /// plus de photos et échoue en `NoAssets` au lieu de réassigner quoi que
    /// ce soit.
    pub async fn start_training(
        &self,
        user_id: &Uuid,
        session_id: &str,
        subject: &str,
    ) -> Result<TrainingJob> {
        let pending = self.assets.list_unlinked_session(user_id, session_id).await?;
        if pending.is_empty() {
            return Err(AppError::NoAssets);
        }

        let manifest_url = self
            .dataset
            .package_dataset(user_id, session_id, &pending)
            .await?;

        let destination = self.destination_for(user_id);
        self.provider.create_destination(&destination).await?;

        let submitted = self
            .provider
            .submit_training(&TrainingSubmission {
                destination: destination.clone(),
                manifest_url,
                subject: subject.to_string(),
                webhook_url: self.webhook_url.clone(),
            })
            .await?;

        tracing::info!(
            "🚀 Entraînement soumis: job={} destination={} photos={}",
            submitted.id,
            destination,
            pending.len()
        );

        let job = self
            .jobs
            .create(&TrainingJob::new(
                submitted.id,
                *user_id,
                subject.to_string(),
                submitted.initial_status,
                destination,
            ))
            .await?;

        let linked = self
            .assets
            .link_session_to_job(user_id, session_id, &job.id)
            .await?;
        tracing::info!("✅ {} photo(s) liée(s) au job {}", linked, job.id);

        Ok(job)
    }

    /// Récupère un job appartenant à l'appelant
    pub async fn get_job(&self, user_id: &Uuid, job_id: &str) -> Result<TrainingJob> {
        let job = self.jobs.get_by_id(job_id).await?;
        if job.user_id != *user_id {
            // Ne pas révéler l'existence du job d'un autre utilisateur
            return Err(AppError::JobNotFound);
        }
        Ok(job)
    }

    /// Liste les jobs de l'appelant, du plus récent au plus ancien
    pub async fn list_jobs(&self, user_id: &Uuid) -> Result<Vec<TrainingJob>> {
        self.jobs.get_by_user(user_id, 50).await
    }

    /// Nom de destination déterministe: préfixe de l'ID utilisateur + horodatage
    fn destination_for(&self, user_id: &Uuid) -> String {
        let user_prefix = &user_id.simple().to_string()[..8];
        format!(
            "{}/portrait-{}-{}",
            self.model_owner,
            user_prefix,
            Utc::now().timestamp()
        )
    }
}
