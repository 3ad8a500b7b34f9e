// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Structural problems (cycles, unknown dependencies, duplicate names) and
//! persistence failures are returned as [`FlowError`]. Failures inside an
//! asset's computation are *not* errors at this level: they are captured in
//! [`AssetResult`](crate::asset::AssetResult) values instead.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cycle detected in asset graph: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Asset '{asset}' depends on unknown asset '{dependency}'")]
    UnknownDependency { asset: String, dependency: String },

    #[error("Duplicate asset name: {0}")]
    DuplicateAsset(String),

    #[error("Invalid asset: {0}")]
    InvalidAsset(String),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("State store error: {0}")]
    Store(String),

    #[error("Schedule error: {0}")]
    Schedule(String),

    #[error("Backfill error: {0}")]
    Backfill(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowError {
    /// Whether this error describes a broken graph rather than a runtime failure.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            FlowError::Cycle { .. }
                | FlowError::UnknownDependency { .. }
                | FlowError::DuplicateAsset(_)
                | FlowError::InvalidAsset(_)
        )
    }
}

/// Marker error for failures an operator considers retryable.
///
/// Operators wrap it into their `anyhow::Error` (directly or as context) and
/// the retry wrapper finds it by walking the error chain.
#[derive(Debug, Clone)]
pub struct TransientError(pub String);

impl fmt::Display for TransientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transient failure: {}", self.0)
    }
}

impl std::error::Error for TransientError {}

/// Returns `true` if any error in the chain is a [`TransientError`].
pub fn is_transient(err: &anyhow::Error) -> bool {
    err.chain().any(|e| e.is::<TransientError>())
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FlowError>;
