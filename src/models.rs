//! Data models and configuration
//!
//! Defines the asset requests handled by the store, the per-operation
//! upload/fetch option maps, the Cloudinary API payloads this crate reads and
//! the construction-time store configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Free-form option mapping forwarded to the remote service.
pub type OptionMap = Map<String, Value>;

/// A file to be persisted. Created by the host per save call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRequest {
    /// Requested file name, e.g. `cat.jpg`.
    pub name: String,
    /// Local path (or remote URL) holding the bytes.
    pub path: String,
}

impl AssetRequest {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Fully-qualified URL of the asset to read.
    #[serde(default)]
    pub path: String,
}

impl ReadOptions {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Upload and fetch option maps.
///
/// The store keeps one read-only instance as its defaults; every operation
/// works on its own clone, which is a full structural copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadOptions {
    #[serde(default)]
    pub upload: OptionMap,
    #[serde(default)]
    pub fetch: OptionMap,
}

impl UploadOptions {
    pub fn new(upload: OptionMap, fetch: OptionMap) -> Self {
        Self { upload, fetch }
    }

    /// The configured upload folder, when it is a string.
    pub fn folder(&self) -> Option<&str> {
        self.upload.get("folder").and_then(Value::as_str)
    }

    pub fn public_id(&self) -> Option<&str> {
        self.upload.get("public_id").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub cloud_name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
}

impl Credentials {
    pub fn new(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Parse a `cloudinary://<api_key>:<api_secret>@<cloud_name>` URL.
    pub fn from_url(url: &str) -> crate::Result<Self> {
        let rest = url.strip_prefix("cloudinary://").ok_or_else(|| {
            crate::Error::Config(format!("CLOUDINARY_URL must start with cloudinary:// ({})", url))
        })?;

        let (userinfo, cloud_name) = rest
            .rsplit_once('@')
            .ok_or_else(|| crate::Error::Config("CLOUDINARY_URL is missing '@<cloud_name>'".to_string()))?;
        let (api_key, api_secret) = userinfo.split_once(':').ok_or_else(|| {
            crate::Error::Config("CLOUDINARY_URL is missing '<api_key>:<api_secret>'".to_string())
        })?;

        // Cloud names never contain a path, but tolerate a trailing slash.
        let cloud_name = cloud_name.trim_end_matches('/');

        Ok(Self::new(cloud_name, api_key, api_secret))
    }
}

/// Fields of an upload response the store reads. Everything else the service
/// returns is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub public_id: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub secure_url: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl UploadResponse {
    /// `public_id.format`, the form used to build delivery URLs.
    pub fn public_id_with_format(&self) -> String {
        if self.format.is_empty() {
            self.public_id.clone()
        } else {
            format!("{}.{}", self.public_id, self.format)
        }
    }
}

/// Construction-time configuration for the store. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawStoreConfig")]
pub struct StoreConfig {
    pub auth: Credentials,
    pub options: UploadOptions,
    pub use_dated_folder: bool,
    /// Enhancement plugin configuration keyed by plugin name.
    pub plugins: OptionMap,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyConfiguration {
    file: Option<OptionMap>,
    image: Option<OptionMap>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStoreConfig {
    auth: Option<Credentials>,
    #[serde(flatten)]
    top_level_auth: Credentials,
    upload: Option<OptionMap>,
    fetch: Option<OptionMap>,
    // Older configs nest options as `configuration.file` / `configuration.image`.
    configuration: Option<LegacyConfiguration>,
    #[serde(default, alias = "use_dated_folder")]
    use_dated_folder: bool,
    #[serde(default)]
    plugins: OptionMap,
}

impl From<RawStoreConfig> for StoreConfig {
    fn from(raw: RawStoreConfig) -> Self {
        let legacy = raw.configuration.unwrap_or_default();

        Self {
            auth: raw.auth.unwrap_or(raw.top_level_auth),
            options: UploadOptions {
                upload: raw.upload.or(legacy.file).unwrap_or_default(),
                fetch: raw.fetch.or(legacy.image).unwrap_or_default(),
            },
            use_dated_folder: raw.use_dated_folder,
            plugins: raw.plugins,
        }
    }
}

impl StoreConfig {
    pub fn new(auth: Credentials, options: UploadOptions) -> Self {
        Self {
            auth,
            options,
            use_dated_folder: false,
            plugins: OptionMap::new(),
        }
    }

    pub fn with_dated_folder(mut self, use_dated_folder: bool) -> Self {
        self.use_dated_folder = use_dated_folder;
        self
    }

    pub fn with_plugin(mut self, name: impl Into<String>, config: Value) -> Self {
        self.plugins.insert(name.into(), config);
        self
    }

    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Build a configuration from `CLOUDINARY_*` environment variables
    /// (a `.env` file is honoured).
    ///
    /// Credentials are not validated here; missing ones surface as API errors
    /// on first use.
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        let auth = match std::env::var("CLOUDINARY_URL") {
            Ok(url) => Credentials::from_url(&url)?,
            Err(_) => Credentials::new(
                std::env::var("CLOUDINARY_CLOUD_NAME").unwrap_or_default(),
                std::env::var("CLOUDINARY_API_KEY").unwrap_or_default(),
                std::env::var("CLOUDINARY_API_SECRET").unwrap_or_default(),
            ),
        };

        let mut upload = OptionMap::new();
        if let Ok(folder) = std::env::var("CLOUDINARY_FOLDER") {
            upload.insert("folder".to_string(), Value::String(folder));
        }
        if env_flag("CLOUDINARY_USE_FILENAME") {
            upload.insert("use_filename".to_string(), Value::Bool(true));
        }

        Ok(Self::new(auth, UploadOptions::new(upload, OptionMap::new()))
            .with_dated_folder(env_flag("CLOUDINARY_USE_DATED_FOLDER")))
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
