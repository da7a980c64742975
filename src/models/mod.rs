pub mod asset;
pub mod image;
pub mod job;
pub mod subscription;
pub mod user;

pub use asset::{AssetStatus, UploadedAsset};
pub use image::GeneratedImage;
pub use job::{TrainingJob, TrainingStatus};
pub use subscription::{PlanName, Subscription, SubscriptionStatus};
pub use user::User;
