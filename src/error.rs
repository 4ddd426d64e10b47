use thiserror::Error;

/// Failures raised by a [`crate::store::KeyValueStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access store file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to encode value for key '{key}': {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },

    #[error("Failed to decode value for key '{key}': {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to write config file: {0}")]
    Write(#[from] std::io::Error),

    #[error("Failed to encode config: {0}")]
    Encode(#[from] serde_json::Error),
}
