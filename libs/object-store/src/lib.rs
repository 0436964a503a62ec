pub mod client;
pub mod error;

pub use client::{Bucket, ObjectInfo, ObjectStore, ObjectStoreConfig, S3ObjectStore, UploadResult};
pub use error::{ObjectStoreError, Stage};
