//! High-density image variants.
//!
//! Uploads one scaled copy of the asset per configured pixel density. The
//! lowest density keeps the plain identifier and provides the returned URL;
//! the others are stored as `<id>@<density>x`, the naming retina.js looks for
//! on the client side.

use super::Enhancement;
use crate::cloudinary::UploadGateway;
use crate::image::dimensions;
use crate::models::{AssetRequest, UploadOptions};
use crate::naming::{file_stem, sanitize_file_name};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub const RETINA_PLUGIN_KEY: &str = "retinajs";

fn default_densities() -> Vec<u32> {
    vec![1, 2]
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetinaConfig {
    /// Width of the 1x variant. Derived from the image when unset.
    #[serde(default)]
    pub base_width: Option<u32>,
    #[serde(default = "default_densities")]
    pub densities: Vec<u32>,
    /// Resolve as soon as the lowest density is stored and let the other
    /// variants finish in the background.
    #[serde(default)]
    pub fire_forget: bool,
}

impl Default for RetinaConfig {
    fn default() -> Self {
        Self {
            base_width: None,
            densities: default_densities(),
            fire_forget: false,
        }
    }
}

impl RetinaConfig {
    /// Parse the plugin configuration. Any non-object truthy value (such as
    /// `true`) enables the plugin with defaults.
    pub fn from_value(value: &Value) -> Result<Self> {
        let config = match value {
            Value::Object(_) => serde_json::from_value(value.clone())?,
            _ => Self::default(),
        };
        config.validated()
    }

    fn validated(mut self) -> Result<Self> {
        self.densities.sort_unstable();
        self.densities.dedup();

        if self.densities.is_empty() {
            return Err(Error::Config("retinajs needs at least one density".to_string()));
        }
        if self.densities[0] == 0 {
            return Err(Error::Config("retinajs densities must be positive".to_string()));
        }
        if self.base_width == Some(0) {
            return Err(Error::Config("retinajs baseWidth must be positive".to_string()));
        }
        Ok(self)
    }
}

/// Chain a `c_scale,w_<width>` step after any configured transformation.
fn with_scale(existing: Option<&Value>, width: u32) -> Value {
    let scale = json!({"width": width, "crop": "scale"});
    match existing {
        Some(Value::Array(steps)) => {
            let mut chained = steps.clone();
            chained.push(scale);
            Value::Array(chained)
        }
        Some(step @ Value::Object(_)) => json!([step, scale]),
        Some(Value::String(raw)) if !raw.is_empty() => {
            Value::String(format!("{}/c_scale,w_{}", raw, width))
        }
        _ => scale,
    }
}

struct Variant {
    density: u32,
    options: UploadOptions,
    want_url: bool,
}

pub struct RetinaPlugin {
    gateway: Arc<dyn UploadGateway>,
    options: UploadOptions,
    config: RetinaConfig,
}

impl RetinaPlugin {
    pub fn new(gateway: Arc<dyn UploadGateway>, options: UploadOptions, config: &Value) -> Result<Self> {
        let config = RetinaConfig::from_value(config)
            .map_err(|e| e.into_adapter("Invalid retinajs plugin configuration"))?;

        Ok(Self {
            gateway,
            options,
            config,
        })
    }

    /// Registry entry point.
    pub fn construct(
        gateway: Arc<dyn UploadGateway>,
        options: UploadOptions,
        config: &Value,
    ) -> Result<Box<dyn Enhancement>> {
        Ok(Box::new(Self::new(gateway, options, config)?))
    }

    async fn base_width(&self, asset: &AssetRequest) -> Result<u32> {
        if let Some(width) = self.config.base_width {
            return Ok(width);
        }

        let (width, _) = dimensions(Path::new(&asset.path))
            .await
            .map_err(|e| e.into_adapter(format!("Could not upload image {}", asset.path)))?;
        let highest = self.config.densities.last().copied().unwrap_or(1);
        Ok((width / highest).max(1))
    }

    fn variants(&self, asset: &AssetRequest, base_width: u32) -> Vec<Variant> {
        let base_id = match self.options.public_id() {
            Some(id) => id.to_string(),
            None => file_stem(&sanitize_file_name(&asset.name)).to_string(),
        };

        self.config
            .densities
            .iter()
            .enumerate()
            .map(|(idx, &density)| {
                let public_id = if idx == 0 {
                    base_id.clone()
                } else {
                    format!("{}@{}x", base_id, density)
                };

                let mut options = self.options.clone();
                options.upload.insert("public_id".to_string(), Value::String(public_id));
                let scaled = with_scale(
                    options.upload.get("transformation"),
                    base_width.saturating_mul(density),
                );
                options.upload.insert("transformation".to_string(), scaled);

                Variant {
                    density,
                    options,
                    want_url: idx == 0,
                }
            })
            .collect()
    }

    fn spawn_upload(
        &self,
        uploads: &mut JoinSet<(u32, Result<Option<String>>)>,
        path: &str,
        variant: Variant,
    ) {
        let gateway = Arc::clone(&self.gateway);
        let path = path.to_string();
        uploads.spawn(async move {
            let result = gateway.upload(&path, &variant.options, variant.want_url).await;
            (variant.density, result)
        });
    }

    async fn save_fire_forget(&self, asset: &AssetRequest, mut variants: Vec<Variant>) -> Result<Option<String>> {
        let base = variants.remove(0);

        for variant in variants {
            let gateway = Arc::clone(&self.gateway);
            let path = asset.path.clone();
            tokio::spawn(async move {
                if let Err(e) = gateway.upload(&path, &variant.options, false).await {
                    warn!("Background upload of {}x variant for {} failed: {}", variant.density, path, e);
                }
            });
        }

        self.gateway.upload(&asset.path, &base.options, true).await
    }
}

#[async_trait]
impl Enhancement for RetinaPlugin {
    async fn save(&self, asset: &AssetRequest) -> Result<Option<String>> {
        let base_width = self.base_width(asset).await?;
        let variants = self.variants(asset, base_width);
        let lowest = variants[0].density;

        debug!(
            asset = %asset.name,
            base_width,
            densities = ?self.config.densities,
            "Uploading density variants"
        );

        if self.config.fire_forget {
            return self.save_fire_forget(asset, variants).await;
        }

        let mut uploads = JoinSet::new();
        for variant in variants {
            self.spawn_upload(&mut uploads, &asset.path, variant);
        }

        let mut url = None;
        while let Some(joined) = uploads.join_next().await {
            let outcome = joined
                .map_err(|e| Error::adapter(format!("Could not upload image {}", asset.path), e))
                .and_then(|(density, result)| result.map(|u| (density, u)));

            match outcome {
                Ok((density, variant_url)) if density == lowest => url = variant_url,
                Ok(_) => {}
                Err(e) => {
                    // Siblings keep running to completion; nothing is rolled back.
                    uploads.detach_all();
                    return Err(e);
                }
            }
        }

        Ok(url)
    }
}
