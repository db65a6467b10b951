use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KitbagError {
    #[error("catalog parse error: {0}")]
    CatalogParse(String),

    #[error("failed to materialize payload into {path}: {reason}")]
    Materialize { path: PathBuf, reason: String },

    #[error("failed to delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("registry operation failed: {0}")]
    Registry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KitbagError>;
