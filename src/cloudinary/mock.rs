use super::UploadGateway;
use crate::models::UploadOptions;
use crate::naming::{base_name, file_stem, join, sanitize_file_name};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One upload seen by [`MockGateway`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedUpload {
    pub path: String,
    pub options: UploadOptions,
    pub want_url: bool,
}

impl RecordedUpload {
    pub fn public_id(&self) -> Option<&str> {
        self.options.public_id()
    }
}

const MOCK_BASE_URL: &str = "https://mock-cdn.example.com";

/// In-memory gateway. Stores identifiers instead of bytes.
#[derive(Clone)]
pub struct MockGateway {
    stored: Arc<Mutex<HashSet<String>>>,
    uploads: Arc<Mutex<Vec<RecordedUpload>>>,
    remote_files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_matching: Arc<Mutex<Option<String>>>,
    upload_delay: Option<Duration>,
    remove_count: Arc<Mutex<usize>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            stored: Arc::new(Mutex::new(HashSet::new())),
            uploads: Arc::new(Mutex::new(Vec::new())),
            remote_files: Arc::new(Mutex::new(HashMap::new())),
            fail_matching: Arc::new(Mutex::new(None)),
            upload_delay: None,
            remove_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Pre-seed an identifier as already uploaded.
    pub fn with_stored(self, public_id: &str) -> Self {
        self.stored.lock().unwrap().insert(public_id.to_string());
        self
    }

    /// Bytes served by `fetch_bytes` for `url`.
    pub fn with_remote_file(self, url: String, content: Vec<u8>) -> Self {
        self.remote_files.lock().unwrap().insert(url, content);
        self
    }

    /// Fail every upload whose identifier contains `pattern` (`""` fails all).
    pub fn with_upload_failure(self, pattern: &str) -> Self {
        *self.fail_matching.lock().unwrap() = Some(pattern.to_string());
        self
    }

    /// Delay successful uploads; failing uploads return immediately.
    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = Some(delay);
        self
    }

    pub fn get_upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn get_uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn get_remove_count(&self) -> usize {
        *self.remove_count.lock().unwrap()
    }

    pub fn is_stored(&self, public_id: &str) -> bool {
        self.stored.lock().unwrap().contains(public_id)
    }

    fn remote_id(path: &str, options: &UploadOptions) -> String {
        let public_id = match options.public_id() {
            Some(id) => id.to_string(),
            None => file_stem(&sanitize_file_name(base_name(path))).to_string(),
        };
        match options.folder() {
            Some(folder) => join(folder, &public_id),
            None => public_id,
        }
    }

    fn should_fail(&self, remote_id: &str) -> bool {
        self.fail_matching
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|pattern| remote_id.contains(pattern))
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UploadGateway for MockGateway {
    async fn upload(&self, path: &str, options: &UploadOptions, want_url: bool) -> Result<Option<String>> {
        let remote_id = Self::remote_id(path, options);

        self.uploads.lock().unwrap().push(RecordedUpload {
            path: path.to_string(),
            options: options.clone(),
            want_url,
        });

        if self.should_fail(&remote_id) {
            return Err(Error::adapter(
                format!("Could not upload image {}", path),
                Error::Api {
                    status: 500,
                    body: format!("Mock upload failure for {}", remote_id),
                },
            ));
        }

        if let Some(delay) = self.upload_delay {
            tokio::time::sleep(delay).await;
        }

        self.stored.lock().unwrap().insert(remote_id.clone());

        if !want_url {
            return Ok(None);
        }
        let format = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("png");
        Ok(Some(format!("{}/{}.{}", MOCK_BASE_URL, remote_id, format)))
    }

    async fn probe_exists(&self, public_id: &str) -> bool {
        self.is_stored(public_id)
    }

    async fn remove(&self, public_id: &str) -> Result<Value> {
        *self.remove_count.lock().unwrap() += 1;

        if self.stored.lock().unwrap().remove(public_id) {
            Ok(json!({"result": "ok"}))
        } else {
            Ok(json!({"result": "not found"}))
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        match self.remote_files.lock().unwrap().get(url) {
            Some(data) => Ok(data.clone()),
            None => Err(Error::adapter(
                format!("Could not read image {}", url),
                Error::Api {
                    status: 404,
                    body: "Not Found".to_string(),
                },
            )),
        }
    }
}
