//! Moving host data into device local memory
pub mod staging;

pub use staging::{ImageUpload, MipLevels, MipRegion, StagingUploader};
