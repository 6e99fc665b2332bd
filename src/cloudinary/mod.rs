//! Cloudinary integration
//!
//! The gateway is the only place that talks to the remote image service:
//! uploads, existence probes, deletes and raw byte reads. The store holds one
//! gateway handle for its whole lifetime instead of configuring a global
//! client.

pub mod client;
pub mod mock;
pub mod transformation;

pub use client::CloudinaryClient;
pub use mock::{MockGateway, RecordedUpload};

use crate::models::UploadOptions;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait UploadGateway: Send + Sync {
    /// Upload the asset at `path` with `options.upload`. With `want_url`, the
    /// delivery URL built from `options.fetch` is returned.
    async fn upload(&self, path: &str, options: &UploadOptions, want_url: bool) -> Result<Option<String>>;

    /// Whether `public_id` exists remotely. Any failure counts as absent.
    async fn probe_exists(&self, public_id: &str) -> bool;

    /// Delete `public_id`, returning the service's raw acknowledgement.
    async fn remove(&self, public_id: &str) -> Result<Value>;

    /// Raw bytes behind a fully-qualified URL.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}
