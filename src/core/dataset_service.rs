// core/dataset_service.rs
//
// Assemblage du dataset d'entraînement: sessions d'upload, enregistrement des
// photos déjà déposées dans le stockage blob, et construction du manifeste
// soumis au fournisseur.

use std::sync::Arc;
use uuid::Uuid;

use crate::infrastructure::database::AssetsRepository;
use crate::infrastructure::storage::StorageService;
use crate::models::UploadedAsset;
use crate::utils::error::{AppError, Result};

/// Callback de fin d'upload: la photo est déjà dans le stockage blob,
/// on n'enregistre que ses métadonnées
#[derive(Debug, Clone)]
pub struct CompletedUpload {
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: i64,
}

pub struct DatasetService {
    assets: AssetsRepository,
    storage: Arc<StorageService>,
    max_asset_size_bytes: i64,
}

impl DatasetService {
    pub fn new(
        assets: AssetsRepository,
        storage: Arc<StorageService>,
        max_asset_size_mb: u64,
    ) -> Self {
        Self {
            assets,
            storage,
            max_asset_size_bytes: (max_asset_size_mb as i64) * 1024 * 1024,
        }
    }

    /// Ouvre une session d'upload et retourne son jeton opaque
    pub fn begin_session(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Enregistre une photo uploadée dans la session donnée
    pub async fn record_asset(
        &self,
        user_id: &Uuid,
        session_id: &str,
        upload: CompletedUpload,
    ) -> Result<UploadedAsset> {
        if session_id.trim().is_empty() {
            return Err(AppError::Validation(
                "session_id est requis".to_string(),
            ));
        }
        if !upload.content_type.starts_with("image/") {
            return Err(AppError::Validation(format!(
                "Type de contenu non supporté: {}",
                upload.content_type
            )));
        }
        if upload.size_bytes <= 0 || upload.size_bytes > self.max_asset_size_bytes {
            return Err(AppError::Validation(format!(
                "Taille de fichier invalide: {} octets",
                upload.size_bytes
            )));
        }
        // Une session déjà consommée par une soumission de training est close
        if self.assets.session_is_linked(user_id, session_id).await? {
            return Err(AppError::Validation(format!(
                "La session {} est déjà liée à un entraînement",
                session_id
            )));
        }

        let asset = UploadedAsset::new(
            *user_id,
            session_id.to_string(),
            upload.storage_path,
            upload.content_type,
            upload.size_bytes,
        );

        self.assets.create(&asset).await
    }

    /// Liste les photos de la session appartenant à l'appelant
    ///
    /// Les photos d'autres utilisateurs et les photos héritées sans session
    /// ne sont jamais retournées.
    pub async fn list_session(
        &self,
        user_id: &Uuid,
        session_id: &str,
    ) -> Result<Vec<UploadedAsset>> {
        if session_id.trim().is_empty() {
            return Err(AppError::Validation(
                "session_id est requis".to_string(),
            ));
        }

        let assets = self.assets.list_by_session(session_id).await?;
        let total = assets.len();
        let owned: Vec<UploadedAsset> = assets
            .into_iter()
            .filter(|asset| asset.user_id == *user_id)
            .collect();
        // Session peuplée exclusivement par d'autres: lecture refusée
        if owned.is_empty() && total > 0 {
            return Err(AppError::Validation(format!(
                "La session {} n'appartient pas à l'appelant",
                session_id
            )));
        }
        Ok(owned)
    }

    /// Construit et dépose le manifeste du dataset pour la soumission
    ///
    /// Le manifeste est un document JSON listant les URLs de téléchargement
    /// des photos; aucun blob intermédiaire volumineux n'est construit.
    ///
    /// # Retourne
    /// * L'URL de téléchargement du manifeste
    pub async fn package_dataset(
        &self,
        user_id: &Uuid,
        session_id: &str,
        assets: &[UploadedAsset],
    ) -> Result<String> {
        let mut asset_urls = Vec::with_capacity(assets.len());
        for asset in assets {
            asset_urls.push(self.storage.download_url(&asset.storage_path, 24).await?);
        }

        let manifest = serde_json::json!({
            "version": 1,
            "session_id": session_id,
            "assets": asset_urls,
        });

        let key = StorageService::dataset_manifest_key(user_id, session_id);
        self.storage
            .put_object(&key, manifest.to_string().as_bytes())
            .await?;

        self.storage.download_url(&key, 24).await
    }
}
