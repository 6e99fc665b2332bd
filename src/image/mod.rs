//! Image inspection helpers
//!
//! Sniffs the MIME type of image bytes before they are sent to the remote
//! service and reads pixel dimensions for the density variants.

use crate::{Error, Result};
use std::path::{Path, PathBuf};

pub fn detect_image_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, 0x50, 0x4E, 0x47, ..] => "image/png",
        [0x47, 0x49, 0x46, 0x38, ..] => "image/gif",
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => "image/webp",
        [b'<', b's', b'v', b'g', ..] | [b'<', b'?', b'x', b'm', b'l', ..] => "image/svg+xml",
        _ => {
            tracing::debug!(
                "Unrecognized image format (first 4 bytes: {:02X?}), sending as octet-stream",
                &bytes[..bytes.len().min(4)]
            );
            "application/octet-stream"
        }
    }
}

/// Width and height of the image at `path`, read on a blocking thread.
pub async fn dimensions(path: &Path) -> Result<(u32, u32)> {
    tokio::task::spawn_blocking({
        let path: PathBuf = path.to_path_buf();
        move || image::image_dimensions(path).map_err(Error::from)
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(format!("Image dimension task join error: {}", e))))?
}
