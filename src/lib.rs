//! Cloudinary-backed storage adapter for images
//!
//! Implements a five-operation storage contract (exists, save, delete, read,
//! serve) on top of Cloudinary's upload API, with deterministic remote
//! naming, per-save option composition and pluggable enhancement plugins that
//! can fan a single save out into several uploads.

pub mod cloudinary;
pub mod error;
pub mod image;
pub mod models;
pub mod naming;
pub mod options;
pub mod plugins;
pub mod store;

pub use error::{Error, Result};
pub use models::{AssetRequest, Credentials, ReadOptions, StoreConfig, UploadOptions};
pub use store::{CloudinaryStore, StorageAdapter};
