//! Error types for the openlake-core crate.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for lake operations.
#[derive(Debug, Error)]
pub enum LakeError {
    #[error("Not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Column not found: {column} (available: {available})")]
    ColumnNotFound { column: String, available: String },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Asset already registered: {0}")]
    DuplicateAsset(String),

    #[error("Asset {asset} depends on unknown asset {dependency}")]
    UnknownDependency { asset: String, dependency: String },

    #[error("Dependency cycle detected at asset {0}")]
    Cycle(String),

    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl LakeError {
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn column_not_found<'a>(
        column: impl Into<String>,
        available: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self::ColumnNotFound {
            column: column.into(),
            available: available.into_iter().collect::<Vec<_>>().join(", "),
        }
    }

    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error reports a missing asset file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, LakeError>;
