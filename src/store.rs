//! Storage adapter backed by Cloudinary.

use crate::cloudinary::{CloudinaryClient, UploadGateway};
use crate::models::{AssetRequest, OptionMap, ReadOptions, StoreConfig, UploadOptions};
use crate::naming::remote_id;
use crate::options::compose_at;
use crate::plugins::{self, PluginRegistry};
use crate::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde_json::Value;
use std::sync::Arc;
use tower::layer::util::Identity;
use tracing::debug;

/// The host-facing storage contract.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Whether `filename` has been stored. Never fails.
    async fn exists(&self, filename: &str) -> bool;

    /// Persist `asset`, returning its delivery URL when one is available.
    async fn save(&self, asset: &AssetRequest) -> Result<Option<String>>;

    /// Remove `filename`, returning the backend's acknowledgement.
    async fn delete(&self, filename: &str) -> Result<Value>;

    /// Raw bytes of the asset at `options.path`.
    async fn read(&self, options: &ReadOptions) -> Result<Vec<u8>>;

    /// Middleware layer for serving assets. Cloudinary serves them from its
    /// CDN, so requests pass straight through.
    fn serve(&self) -> Identity {
        Identity::new()
    }
}

/// Cloudinary implementation of [`StorageAdapter`].
///
/// Configuration is captured once at construction and never mutated; every
/// operation works on its own copy of the default options.
pub struct CloudinaryStore {
    gateway: Arc<dyn UploadGateway>,
    defaults: UploadOptions,
    use_dated_folder: bool,
    plugins: OptionMap,
    registry: PluginRegistry,
}

impl CloudinaryStore {
    /// Build a store talking to Cloudinary with `config.auth`.
    pub fn new(config: StoreConfig) -> Self {
        let client = CloudinaryClient::new(config.auth.clone());
        Self::with_gateway(config, Arc::new(client))
    }

    pub fn with_gateway(config: StoreConfig, gateway: Arc<dyn UploadGateway>) -> Self {
        debug!(
            use_dated_folder = config.use_dated_folder,
            options = ?config.options,
            plugins = ?config.plugins,
            "Constructing Cloudinary store"
        );

        Self {
            gateway,
            defaults: config.options,
            use_dated_folder: config.use_dated_folder,
            plugins: config.plugins,
            registry: PluginRegistry::default(),
        }
    }

    pub fn with_registry(mut self, registry: PluginRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Read-only default options captured at construction.
    pub fn defaults(&self) -> &UploadOptions {
        &self.defaults
    }

    /// Remote identifier used by `exists` and `delete` for `filename`.
    pub fn remote_id(&self, filename: &str) -> String {
        remote_id(filename, self.defaults.folder())
    }

    /// Save `asset` as if it were `date`, which drives the dated folder.
    pub async fn save_at(&self, asset: &AssetRequest, date: NaiveDate) -> Result<Option<String>> {
        let options = compose_at(&self.defaults, asset, self.use_dated_folder, date);
        plugins::run(&self.registry, &self.plugins, &self.gateway, options, asset).await
    }
}

#[async_trait]
impl StorageAdapter for CloudinaryStore {
    async fn exists(&self, filename: &str) -> bool {
        let public_id = self.remote_id(filename);
        debug!(filename, public_id = %public_id, "Checking existence");
        self.gateway.probe_exists(&public_id).await
    }

    async fn save(&self, asset: &AssetRequest) -> Result<Option<String>> {
        debug!(name = %asset.name, path = %asset.path, "Saving image");
        self.save_at(asset, Local::now().date_naive()).await
    }

    async fn delete(&self, filename: &str) -> Result<Value> {
        let public_id = self.remote_id(filename);
        debug!(filename, public_id = %public_id, "Deleting image");
        self.gateway.remove(&public_id).await
    }

    async fn read(&self, options: &ReadOptions) -> Result<Vec<u8>> {
        debug!(path = %options.path, "Reading image");
        self.gateway.fetch_bytes(&options.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudinary::MockGateway;
    use crate::models::Credentials;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    fn config(upload: Value) -> StoreConfig {
        StoreConfig::new(
            Credentials::new("demo", "key", "secret"),
            UploadOptions::new(serde_json::from_value(upload).unwrap(), OptionMap::new()),
        )
    }

    fn store(config: StoreConfig, mock: &MockGateway) -> CloudinaryStore {
        CloudinaryStore::with_gateway(config, Arc::new(mock.clone()))
    }

    #[tokio::test]
    async fn test_exists_uses_folder_and_strips_extension() {
        let mock = MockGateway::new().with_stored("blog/cat");
        let store = store(config(json!({"folder": "blog"})), &mock);

        assert!(store.exists("/content/images/cat.jpg").await);
        assert!(!store.exists("dog.jpg").await);
    }

    #[tokio::test]
    async fn test_save_then_exists_round_trip() {
        let mock = MockGateway::new();
        let store = store(config(json!({"use_filename": true, "folder": "blog"})), &mock);

        assert!(!store.exists("cat.jpg").await);
        let url = store
            .save(&AssetRequest::new("cat.jpg", "/tmp/upload-1.jpg"))
            .await
            .unwrap();

        assert_eq!(url.as_deref(), Some("https://mock-cdn.example.com/blog/cat.jpg"));
        assert!(store.exists("cat.jpg").await);
    }

    #[tokio::test]
    async fn test_delete_then_exists() {
        let mock = MockGateway::new().with_stored("cat");
        let store = store(config(json!({})), &mock);

        assert_eq!(store.delete("cat.png").await.unwrap(), json!({"result": "ok"}));
        assert!(!store.exists("cat.png").await);
    }

    #[tokio::test]
    async fn test_save_dated_folder_scenario() {
        let mock = MockGateway::new();
        let store = store(config(json!({"use_filename": true})).with_dated_folder(true), &mock);

        let date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        store
            .save_at(&AssetRequest::new("cat.jpg", "/tmp/cat.jpg"), date)
            .await
            .unwrap();

        let uploads = mock.get_uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].options.public_id(), Some("cat"));
        assert_eq!(uploads[0].options.folder(), Some("2024/03"));
    }

    #[tokio::test]
    async fn test_save_never_mutates_defaults() {
        let mock = MockGateway::new();
        let config = config(json!({"use_filename": true, "folder": "blog", "public_id": "orig"}))
            .with_dated_folder(true)
            .with_plugin("retinajs", json!({"baseWidth": 100}));
        let initial = config.options.clone();
        let store = store(config, &mock);

        for name in ["a.jpg", "b.png", "c.gif"] {
            store
                .save(&AssetRequest::new(name, format!("/tmp/{}", name)))
                .await
                .unwrap();
        }

        assert_eq!(store.defaults(), &initial);
        assert_eq!(mock.get_upload_count(), 6);
    }

    #[tokio::test]
    async fn test_save_failure_surfaces_adapter_error() {
        let mock = MockGateway::new().with_upload_failure("");
        let store = store(config(json!({})), &mock);

        let err = store
            .save(&AssetRequest::new("cat.jpg", "/tmp/cat.jpg"))
            .await
            .unwrap_err();
        assert!(err.is_adapter());
        assert!(err.to_string().contains("/tmp/cat.jpg"));
    }

    #[tokio::test]
    async fn test_read_returns_bytes() {
        let mock = MockGateway::new().with_remote_file("https://cdn/cat.jpg".to_string(), vec![9, 8, 7]);
        let store = store(config(json!({})), &mock);

        assert_eq!(
            store.read(&ReadOptions::new("https://cdn/cat.jpg")).await.unwrap(),
            vec![9, 8, 7]
        );
        assert!(store.read(&ReadOptions::default()).await.unwrap_err().is_adapter());
    }

    #[tokio::test]
    async fn test_serve_passes_requests_through() {
        let store = store(config(json!({})), &MockGateway::new());

        let service = ServiceBuilder::new()
            .layer(store.serve())
            .service(service_fn(|request: &'static str| async move {
                Ok::<_, Infallible>(format!("handled {}", request))
            }));

        assert_eq!(service.oneshot("GET /cat.jpg").await.unwrap(), "handled GET /cat.jpg");
    }
}
