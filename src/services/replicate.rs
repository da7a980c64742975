// services/replicate.rs
//
// Adaptateur HTTP vers le fournisseur d'entraînement/inférence (API de type
// Replicate). Seule implémentation de production des traits de
// `services::providers`.

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::models::TrainingStatus;
use crate::services::providers::{
    parse_status_report, InferenceProvider, ProviderOutput, StatusReport, SubmittedTraining,
    TrainingProvider, TrainingSubmission,
};
use crate::utils::error::{AppError, Result};

pub struct ReplicateClient {
    http_client: HttpClient,
    base_url: String,
    api_token: String,
}

/// Payload commun des réponses d'entraînement du fournisseur
#[derive(Debug, Deserialize)]
struct TrainingEnvelope {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<ProviderOutput>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelEnvelope {
    #[serde(default)]
    latest_version: Option<VersionRef>,
}

#[derive(Debug, Deserialize)]
struct VersionRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PredictionEnvelope {
    status: String,
    #[serde(default)]
    output: Option<Vec<String>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateModelRequest<'a> {
    owner: &'a str,
    name: &'a str,
    visibility: &'a str,
    hardware: &'a str,
}

impl ReplicateClient {
    pub fn new(base_url: &str, api_token: &str) -> Self {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_token)
    }
}

#[async_trait]
impl TrainingProvider for ReplicateClient {
    async fn create_destination(&self, destination: &str) -> Result<()> {
        let (owner, name) = destination.split_once('/').ok_or_else(|| {
            AppError::Validation(format!("Destination invalide: {}", destination))
        })?;

        let response = self
            .http_client
            .post(self.url("/models"))
            .header("Authorization", self.auth_header())
            .json(&CreateModelRequest {
                owner,
                name,
                visibility: "private",
                hardware: "gpu-a40-large",
            })
            .send()
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            // Destination déjà créée par une tentative précédente
            StatusCode::CONFLICT => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::ExternalService(format!(
                    "Création de la destination refusée ({}): {}",
                    status, body
                )))
            }
        }
    }

    async fn submit_training(&self, submission: &TrainingSubmission) -> Result<SubmittedTraining> {
        let response = self
            .http_client
            .post(self.url("/trainings"))
            .header("Authorization", self.auth_header())
            .json(&json!({
                "destination": submission.destination,
                "input": {
                    "input_images": submission.manifest_url,
                    "subject": submission.subject,
                },
                "webhook": submission.webhook_url,
                "webhook_events_filter": ["completed"],
            }))
            .send()
            .await
            .map_err(|e| AppError::ExternalSubmission(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalSubmission(format!(
                "Soumission refusée ({}): {}",
                status, body
            )));
        }

        let envelope: TrainingEnvelope = response
            .json()
            .await
            .map_err(|e| AppError::ParseError(e.to_string()))?;

        let initial_status = match parse_status_report(
            &envelope.status,
            envelope.output.as_ref(),
            envelope.error.as_deref(),
        )? {
            StatusReport::Processing => TrainingStatus::Processing,
            // Une soumission acceptée ne peut pas être déjà terminale
            _ => TrainingStatus::Queued,
        };

        Ok(SubmittedTraining {
            id: envelope.id,
            initial_status,
        })
    }

    async fn training_status(&self, job_id: &str) -> Result<StatusReport> {
        let response = self
            .http_client
            .get(self.url(&format!("/trainings/{}", job_id)))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::JobNotFound);
        }
        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "Requête de statut refusée: {}",
                response.status()
            )));
        }

        let envelope: TrainingEnvelope = response
            .json()
            .await
            .map_err(|e| AppError::ParseError(e.to_string()))?;

        parse_status_report(
            &envelope.status,
            envelope.output.as_ref(),
            envelope.error.as_deref(),
        )
    }

    async fn latest_version(&self, destination: &str) -> Result<Option<String>> {
        let response = self
            .http_client
            .get(self.url(&format!("/models/{}", destination)))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "Requête de version refusée: {}",
                response.status()
            )));
        }

        let envelope: ModelEnvelope = response
            .json()
            .await
            .map_err(|e| AppError::ParseError(e.to_string()))?;

        Ok(envelope
            .latest_version
            .map(|version| format!("{}:{}", destination, version.id)))
    }
}

#[async_trait]
impl InferenceProvider for ReplicateClient {
    async fn generate(&self, model_reference: &str, prompt: &str) -> Result<Vec<u8>> {
        let response = self
            .http_client
            .post(self.url("/predictions"))
            .header("Authorization", self.auth_header())
            .header("Prefer", "wait")
            .json(&json!({
                "version": model_reference,
                "input": { "prompt": prompt },
            }))
            .send()
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Génération refusée ({}): {}",
                status, body
            )));
        }

        let envelope: PredictionEnvelope = response
            .json()
            .await
            .map_err(|e| AppError::ParseError(e.to_string()))?;

        if envelope.status != "succeeded" {
            return Err(AppError::ExternalService(format!(
                "Génération non aboutie: {} ({})",
                envelope.status,
                envelope.error.unwrap_or_default()
            )));
        }

        let image_url = envelope
            .output
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| {
                AppError::ExternalService("Génération sans sortie".to_string())
            })?;

        // Télécharger l'image produite
        let image = self
            .http_client
            .get(&image_url)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        if !image.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "Téléchargement de l'image refusé: {}",
                image.status()
            )));
        }

        Ok(image
            .bytes()
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?
            .to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ReplicateClient {
        ReplicateClient::new(&server.uri(), "test-token")
    }

    #[tokio::test]
    async fn test_submit_training_returns_id_and_initial_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/trainings"))
            .and(header("Authorization", "Bearer test-token"))
            .and(body_partial_json(serde_json::json!({
                "destination": "portrait-platform/portrait-abc-1700000000"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "train-xyz",
                "status": "starting"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let submitted = client
            .submit_training(&TrainingSubmission {
                destination: "portrait-platform/portrait-abc-1700000000".to_string(),
                manifest_url: "https://blob/datasets/u/s.json".to_string(),
                subject: "femme".to_string(),
                webhook_url: "https://api/webhooks/training".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(submitted.id, "train-xyz");
        assert_eq!(submitted.initial_status, TrainingStatus::Queued);
    }

    #[tokio::test]
    async fn test_submit_training_failure_is_retryable_submission_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/trainings"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result = client
            .submit_training(&TrainingSubmission {
                destination: "o/m".to_string(),
                manifest_url: "https://blob/m.json".to_string(),
                subject: "homme".to_string(),
                webhook_url: "https://api/webhooks/training".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AppError::ExternalSubmission(_))));
    }

    #[tokio::test]
    async fn test_create_destination_conflict_is_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.create_destination("owner/existing").await.is_ok());
    }

    #[tokio::test]
    async fn test_training_status_decodes_succeeded_output() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/trainings/train-xyz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "train-xyz",
                "status": "succeeded",
                "output": { "version": "owner/model:abc123" }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let report = client.training_status("train-xyz").await.unwrap();
        assert_eq!(
            report,
            StatusReport::Succeeded {
                model_reference: Some("owner/model:abc123".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_latest_version_absent_model_is_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/models/owner/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.latest_version("owner/ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_generate_downloads_first_output() {
        let server = MockServer::start().await;

        let image_url = format!("{}/files/out.png", server.uri());
        Mock::given(method("POST"))
            .and(path("/predictions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "succeeded",
                "output": [image_url]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/files/out.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png-bytes".to_vec()))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let bytes = client
            .generate("owner/model:abc123", "portrait studio")
            .await
            .unwrap();
        assert_eq!(bytes, b"png-bytes");
    }
}
