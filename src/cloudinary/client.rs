use super::transformation::{delivery_url, render};
use super::UploadGateway;
use crate::image::detect_image_mime;
use crate::models::{Credentials, OptionMap, UploadOptions, UploadResponse};
use crate::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_API_BASE_URL: &str = "https://api.cloudinary.com";
const DEFAULT_DELIVERY_BASE_URL: &str = "https://res.cloudinary.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Parameters that never take part in the request signature.
const UNSIGNED_PARAMS: &[&str] = &["file", "api_key", "resource_type", "cloud_name", "signature"];

/// Hex SHA-256 request signature: parameters sorted by name, `k=v` joined
/// with `&`, followed by the API secret.
pub fn sign(params: &BTreeMap<String, String>, api_secret: &str) -> String {
    let to_sign = params
        .iter()
        .filter(|(key, value)| !value.is_empty() && !UNSIGNED_PARAMS.contains(&key.as_str()))
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");

    hex::encode(Sha256::digest(format!("{}{}", to_sign, api_secret).as_bytes()))
}

/// Encode one option value as an API parameter. `None` drops the parameter.
fn param_value(key: &str, value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ if key == "transformation" => Some(render(value)),
        Value::Array(items) => {
            let scalars: Option<Vec<String>> = items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect();
            match scalars {
                Some(scalars) => Some(scalars.join(",")),
                None => serde_json::to_string(value).ok(),
            }
        }
        Value::Object(map) if key == "context" || key == "metadata" => Some(
            map.iter()
                .filter_map(|(k, v)| param_value(k, v).map(|v| format!("{}={}", k, v)))
                .collect::<Vec<_>>()
                .join("|"),
        ),
        Value::Object(_) => serde_json::to_string(value).ok(),
    }
}

fn upload_params(options: &OptionMap) -> BTreeMap<String, String> {
    options
        .iter()
        .filter_map(|(key, value)| param_value(key, value).map(|v| (key.clone(), v)))
        .collect()
}

fn is_remote(path: &str) -> bool {
    ["http://", "https://", "data:"]
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

/// Cloudinary REST client implementing [`UploadGateway`].
///
/// Holds the account credentials for its whole lifetime; every call signs its
/// own request.
pub struct CloudinaryClient {
    client: Client,
    credentials: Credentials,
    api_base_url: String,
    delivery_base_url: String,
    timeout: Duration,
}

impl CloudinaryClient {
    pub fn new(credentials: Credentials) -> Self {
        Self::new_with_client(credentials, Client::new())
    }

    pub fn new_with_client(credentials: Credentials, client: Client) -> Self {
        Self {
            client,
            credentials,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            delivery_base_url: DEFAULT_DELIVERY_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_base_url(mut self, base_url: String) -> Self {
        self.api_base_url = base_url;
        self
    }

    pub fn with_delivery_base_url(mut self, base_url: String) -> Self {
        self.delivery_base_url = base_url;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delivery URL for `public_id` (including its format extension).
    pub fn url(&self, public_id: &str, fetch: &OptionMap) -> String {
        delivery_url(
            &self.delivery_base_url,
            &self.credentials.cloud_name,
            public_id,
            fetch,
        )
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/v1_1/{}/image/{}",
            self.api_base_url.trim_end_matches('/'),
            self.credentials.cloud_name,
            action
        )
    }

    fn signed(&self, mut params: BTreeMap<String, String>) -> BTreeMap<String, String> {
        params.insert("timestamp".to_string(), Utc::now().timestamp().to_string());
        params.insert("signature_algorithm".to_string(), "sha256".to_string());
        let signature = sign(&params, &self.credentials.api_secret);
        params.insert("signature".to_string(), signature);
        params.insert("api_key".to_string(), self.credentials.api_key.clone());
        params
    }

    async fn post_form<Resp: DeserializeOwned>(
        &self,
        action: &str,
        params: BTreeMap<String, String>,
    ) -> Result<Resp> {
        let url = self.endpoint(action);
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .form(&self.signed(params))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn file_param(&self, path: &str) -> Result<String> {
        if is_remote(path) {
            return Ok(path.to_string());
        }

        let bytes = tokio::fs::read(path).await?;
        Ok(format!(
            "data:{};base64,{}",
            detect_image_mime(&bytes),
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        ))
    }

    async fn upload_file(&self, path: &str, options: &OptionMap) -> Result<UploadResponse> {
        let mut params = upload_params(options);
        params.insert("file".to_string(), self.file_param(path).await?);
        self.post_form("upload", params).await
    }

    fn public_id_params(public_id: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("public_id".to_string(), public_id.to_string())])
    }
}

#[async_trait]
impl UploadGateway for CloudinaryClient {
    async fn upload(&self, path: &str, options: &UploadOptions, want_url: bool) -> Result<Option<String>> {
        debug!(path, want_url, "Uploading image");

        let response = self.upload_file(path, &options.upload).await.map_err(|e| {
            error!("Cloudinary upload of {} failed: {}", path, e);
            Error::adapter(format!("Could not upload image {}", path), e)
        })?;

        debug!(public_id = %response.public_id, format = %response.format, "Upload complete");

        if want_url {
            return Ok(Some(self.url(&response.public_id_with_format(), &options.fetch)));
        }
        Ok(None)
    }

    async fn probe_exists(&self, public_id: &str) -> bool {
        let mut params = Self::public_id_params(public_id);
        params.insert("type".to_string(), "upload".to_string());

        match self.post_form::<Value>("explicit", params).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Existence probe for {} failed, treating as absent: {}", public_id, e);
                false
            }
        }
    }

    async fn remove(&self, public_id: &str) -> Result<Value> {
        self.post_form("destroy", Self::public_id_params(public_id))
            .await
            .map_err(|e| {
                error!("Cloudinary destroy of {} failed: {}", public_id, e);
                Error::adapter(format!("Could not delete image {}", public_id), e)
            })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let fetch = async {
            let response = self
                .client
                .get(url)
                .timeout(self.timeout)
                .send()
                .await?
                .error_for_status()?;
            Ok::<_, Error>(response.bytes().await?.to_vec())
        };

        fetch.await.map_err(|e| {
            error!("Reading {} failed: {}", url, e);
            Error::adapter(format!("Could not read image {}", url), e)
        })
    }
}
