//! Per-operation option composition
//!
//! Builds the upload/fetch options for a single save from the store's
//! read-only defaults. The defaults are never touched: each call gets its own
//! structural copy, so concurrent saves cannot observe each other's changes.

use crate::models::{AssetRequest, UploadOptions};
use crate::naming::{dated_folder, file_stem, sanitize_file_name};
use chrono::{Local, NaiveDate};
use serde_json::Value;
use tracing::debug;

/// JavaScript-style truthiness, used for flags that arrive from loosely typed
/// configuration (`true`, `1`, `"yes"`).
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Compose options for `asset` using today's local date for dated folders.
pub fn compose(defaults: &UploadOptions, asset: &AssetRequest, use_dated_folder: bool) -> UploadOptions {
    compose_at(defaults, asset, use_dated_folder, Local::now().date_naive())
}

/// Compose options for `asset` as of `date`.
///
/// 1. When `upload.use_filename` is truthy, `upload.public_id` is forced to the
///    sanitized stem of the asset name.
/// 2. When `use_dated_folder` is set, `upload.folder` gets `YYYY/MM` appended.
pub fn compose_at(
    defaults: &UploadOptions,
    asset: &AssetRequest,
    use_dated_folder: bool,
    date: NaiveDate,
) -> UploadOptions {
    let mut options = defaults.clone();

    if options.upload.get("use_filename").is_some_and(is_truthy) {
        let public_id = file_stem(&sanitize_file_name(&asset.name)).to_string();
        options
            .upload
            .insert("public_id".to_string(), Value::String(public_id));
    }

    if use_dated_folder {
        let folder = dated_folder(options.folder(), date);
        options
            .upload
            .insert("folder".to_string(), Value::String(folder));
    }

    debug!(asset = %asset.name, options = ?options, "Composed upload options");
    options
}
