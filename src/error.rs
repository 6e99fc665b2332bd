//! Error handling and custom error types
//!
//! Every storage operation surfaces failures as [`Error::Adapter`], which wraps
//! the underlying cause together with a message naming the file involved.
//! The remaining variants are the low-level causes raised inside the gateway
//! and configuration loaders.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{message}: {source}")]
    Adapter {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cloudinary API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),
}

impl Error {
    /// Wrap `source` into the adapter error kind with a human-readable message.
    pub fn adapter(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Adapter {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Re-wrap any non-adapter error; adapter errors pass through untouched.
    pub fn into_adapter(self, message: impl Into<String>) -> Self {
        match self {
            Error::Adapter { .. } => self,
            other => Error::adapter(message, other),
        }
    }

    pub fn is_adapter(&self) -> bool {
        matches!(self, Error::Adapter { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
