pub mod auth;
pub mod dataset_service;
pub mod generation_service;
pub mod quota_service;
pub mod reconciler;
pub mod training_service;

pub use auth::AuthenticatedUser;
pub use dataset_service::DatasetService;
pub use generation_service::{GenerationService, ModelSelector};
pub use quota_service::QuotaService;
pub use reconciler::Reconciler;
pub use training_service::TrainingService;
