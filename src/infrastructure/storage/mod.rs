// infrastructure/storage
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::utils::error::{AppError, Result};

/// Service de stockage blob: S3/MinIO avec repli sur le système de fichiers
/// local quand aucun endpoint S3 n'est configuré (développement et tests).
#[derive(Debug, Clone)]
pub struct StorageService {
    s3_client: Option<S3Client>,
    bucket: String,
    local_dir: PathBuf,
}

impl StorageService {
    pub fn new(
        endpoint: Option<&str>,
        access_key: Option<&str>,
        secret_key: Option<&str>,
        bucket: &str,
        local_dir: &str,
    ) -> Self {
        let s3_client = match (endpoint, access_key, secret_key) {
            (Some(endpoint), Some(access_key), Some(secret_key)) => {
                Some(Self::create_s3_client(endpoint, access_key, secret_key))
            }
            _ => None,
        };

        Self {
            s3_client,
            bucket: bucket.to_string(),
            local_dir: PathBuf::from(local_dir),
        }
    }

    /// Stockage local pur, pour les tests
    pub fn new_local(local_dir: &str) -> Self {
        Self {
            s3_client: None,
            bucket: String::new(),
            local_dir: PathBuf::from(local_dir),
        }
    }

    fn create_s3_client(endpoint: &str, access_key: &str, secret_key: &str) -> S3Client {
        let creds = Credentials::new(access_key, secret_key, None, None, "minio");

        let config = aws_sdk_s3::Config::builder()
            .credentials_provider(creds)
            .endpoint_url(endpoint)
            .region(Region::new("us-east-1"))
            .force_path_style(true)
            .build();

        S3Client::from_conf(config)
    }

    /// Écrit un objet sous la clé donnée et retourne la clé
    pub async fn put_object(&self, key: &str, data: &[u8]) -> Result<String> {
        if let Some(client) = &self.s3_client {
            client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(data.to_vec()))
                .send()
                .await
                .map_err(|e| AppError::StorageError(e.to_string()))?;
        } else {
            let path = self.local_dir.join(key);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AppError::StorageError(e.to_string()))?;
            }
            let mut file = fs::File::create(&path)
                .await
                .map_err(|e| AppError::StorageError(e.to_string()))?;
            file.write_all(data)
                .await
                .map_err(|e| AppError::StorageError(e.to_string()))?;
        }

        Ok(key.to_string())
    }

    /// Lit un objet
    pub async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        if let Some(client) = &self.s3_client {
            let response = client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| AppError::StorageError(e.to_string()))?;

            let bytes = response
                .body
                .collect()
                .await
                .map_err(|e| AppError::StorageError(e.to_string()))?
                .to_vec();

            Ok(bytes)
        } else {
            fs::read(self.local_dir.join(key))
                .await
                .map_err(|e| AppError::StorageError(e.to_string()))
        }
    }

    /// Génère une URL de téléchargement signée pour un objet
    pub async fn download_url(&self, key: &str, expires_in_hours: u32) -> Result<String> {
        if let Some(client) = &self.s3_client {
            let presigned_request = client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .presigned(
                    PresigningConfig::expires_in(std::time::Duration::from_secs(
                        expires_in_hours as u64 * 3600,
                    ))
                    .map_err(|e| AppError::StorageError(e.to_string()))?,
                )
                .await
                .map_err(|e| AppError::StorageError(e.to_string()))?;

            Ok(presigned_request.uri().to_string())
        } else {
            // Pour le stockage local, un chemin relatif suffit
            Ok(format!("/storage/{}", key))
        }
    }

    /// Clé de stockage pour le manifeste d'un dataset d'entraînement
    pub fn dataset_manifest_key(user_id: &Uuid, session_id: &str) -> String {
        format!("datasets/{}/{}.json", user_id, session_id)
    }

    /// Stocke une image générée et retourne sa clé
    pub async fn store_generated_image(&self, user_id: &Uuid, data: &[u8]) -> Result<String> {
        let key = format!("generations/{}/{}.png", user_id, Uuid::new_v4());
        self.put_object(&key, data).await
    }
}
