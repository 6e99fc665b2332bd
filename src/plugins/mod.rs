//! Enhancement pipeline
//!
//! An enhancement plugin takes over a single save and may turn it into
//! several uploads (for example one per pixel density). Plugins are selected
//! by configuration key through a [`PluginRegistry`]; at most one plugin runs
//! per save, and without one the save is a plain gateway upload.

pub mod retina;

pub use retina::{RetinaConfig, RetinaPlugin, RETINA_PLUGIN_KEY};

use crate::cloudinary::UploadGateway;
use crate::models::{AssetRequest, OptionMap, UploadOptions};
use crate::options::is_truthy;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait Enhancement: Send + Sync {
    /// Perform the save, resolving once with the same shape as a direct
    /// upload that asked for a URL.
    async fn save(&self, asset: &AssetRequest) -> Result<Option<String>>;
}

/// Builds a plugin for one save from the gateway, the composed options and
/// the plugin's own configuration.
pub type PluginConstructor =
    fn(Arc<dyn UploadGateway>, UploadOptions, &Value) -> Result<Box<dyn Enhancement>>;

/// Ordered mapping from configuration keys to plugin constructors.
#[derive(Clone)]
pub struct PluginRegistry {
    entries: Vec<(String, PluginConstructor)>,
}

impl PluginRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register `constructor` under `key`, replacing any earlier entry for it.
    pub fn register(mut self, key: &str, constructor: PluginConstructor) -> Self {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = constructor,
            None => self.entries.push((key.to_string(), constructor)),
        }
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// The first registered plugin whose key is configured with a truthy
    /// value. Unknown configuration keys are ignored.
    pub fn select<'a>(&self, plugins: &'a OptionMap) -> Option<(&str, PluginConstructor, &'a Value)> {
        self.entries.iter().find_map(|(key, constructor)| {
            plugins
                .get(key)
                .filter(|config| is_truthy(config))
                .map(|config| (key.as_str(), *constructor, config))
        })
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::empty().register(RETINA_PLUGIN_KEY, RetinaPlugin::construct)
    }
}

/// Run one save through the pipeline: the selected plugin if any, otherwise a
/// direct upload asking for the delivery URL.
pub async fn run(
    registry: &PluginRegistry,
    plugins: &OptionMap,
    gateway: &Arc<dyn UploadGateway>,
    options: UploadOptions,
    asset: &AssetRequest,
) -> Result<Option<String>> {
    match registry.select(plugins) {
        Some((key, constructor, config)) => {
            debug!(plugin = key, asset = %asset.name, "Delegating save to enhancement plugin");
            let plugin = constructor(Arc::clone(gateway), options, config)?;
            plugin.save(asset).await
        }
        None => gateway.upload(&asset.path, &options, true).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudinary::MockGateway;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NOOP_SAVES: AtomicUsize = AtomicUsize::new(0);

    struct NoopPlugin;

    #[async_trait]
    impl Enhancement for NoopPlugin {
        async fn save(&self, _asset: &AssetRequest) -> Result<Option<String>> {
            NOOP_SAVES.fetch_add(1, Ordering::SeqCst);
            Ok(Some("noop".to_string()))
        }
    }

    fn noop(_: Arc<dyn UploadGateway>, _: UploadOptions, _: &Value) -> Result<Box<dyn Enhancement>> {
        Ok(Box::new(NoopPlugin))
    }

    fn plugins(value: Value) -> OptionMap {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_default_registry_knows_retinajs() {
        let registry = PluginRegistry::default();
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["retinajs"]);
    }

    #[test]
    fn test_select_ignores_unknown_and_falsy_keys() {
        let registry = PluginRegistry::default();

        assert!(registry.select(&plugins(json!({"other": {}}))).is_none());
        assert!(registry.select(&plugins(json!({"retinajs": false}))).is_none());
        assert!(registry.select(&plugins(json!({"retinajs": null}))).is_none());
        assert_eq!(
            registry.select(&plugins(json!({"retinajs": {}}))).map(|(key, _, _)| key),
            Some("retinajs")
        );
    }

    #[test]
    fn test_select_follows_registration_order() {
        let registry = PluginRegistry::empty()
            .register("noop", noop)
            .register(RETINA_PLUGIN_KEY, RetinaPlugin::construct);

        let configured = plugins(json!({"retinajs": {}, "noop": true}));
        let selected = registry.select(&configured);
        assert_eq!(selected.map(|(key, _, _)| key), Some("noop"));
    }

    #[test]
    fn test_register_replaces_existing_key() {
        let registry = PluginRegistry::default().register(RETINA_PLUGIN_KEY, noop);
        assert_eq!(registry.keys().count(), 1);
    }

    #[tokio::test]
    async fn test_run_without_plugin_uploads_directly() {
        let mock = MockGateway::new();
        let gateway: Arc<dyn UploadGateway> = Arc::new(mock.clone());
        let asset = AssetRequest::new("cat.jpg", "/tmp/cat.jpg");

        let url = run(
            &PluginRegistry::default(),
            &OptionMap::new(),
            &gateway,
            UploadOptions::default(),
            &asset,
        )
        .await
        .unwrap();

        assert_eq!(url.as_deref(), Some("https://mock-cdn.example.com/cat.jpg"));
        let uploads = mock.get_uploads();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].want_url);
    }

    #[tokio::test]
    async fn test_run_delegates_to_selected_plugin() {
        let mock = MockGateway::new();
        let gateway: Arc<dyn UploadGateway> = Arc::new(mock.clone());
        let registry = PluginRegistry::empty().register("noop", noop);
        let before = NOOP_SAVES.load(Ordering::SeqCst);

        let url = run(
            &registry,
            &plugins(json!({"noop": {"anything": 1}})),
            &gateway,
            UploadOptions::default(),
            &AssetRequest::new("cat.jpg", "/tmp/cat.jpg"),
        )
        .await
        .unwrap();

        assert_eq!(url.as_deref(), Some("noop"));
        assert_eq!(NOOP_SAVES.load(Ordering::SeqCst), before + 1);
        assert_eq!(mock.get_upload_count(), 0);
    }
}
