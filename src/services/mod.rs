pub mod providers;
pub mod replicate;

pub use providers::{InferenceProvider, StatusReport, TrainingProvider};
pub use replicate::ReplicateClient;
