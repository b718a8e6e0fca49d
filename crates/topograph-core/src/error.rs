//! Error type for the fallible edges of the engine (config and on-disk state)

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ViewError>;

/// Failures that can reach a caller.
///
/// Disposed surfaces, dangling edges and reserved property keys are never
/// reported here; those are recovered where they happen.
#[derive(Error, Debug)]
pub enum ViewError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid JSON in {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ViewError {
    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        ViewError::Json {
            context: context.into(),
            source,
        }
    }
}
