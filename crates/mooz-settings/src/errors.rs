//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why the hub settings could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read hub settings at {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not valid JSON.
    #[error("hub settings at {} are not valid JSON: {source}", path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Parser failure, with line and column.
        #[source]
        source: serde_json::Error,
    },
    /// The merged document does not fit the settings schema.
    #[error("hub settings do not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
    /// A value the hub cannot run with.
    #[error("invalid hub setting: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
