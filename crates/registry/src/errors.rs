//! Error types for the store registry

use kvscope_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Store with name '{name}' already registered")]
    NameConflict { name: String },

    #[error("Failed to open store '{name}' at {}: {source}", path.display())]
    OpenFailure {
        name: String,
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("Store '{name}' not found")]
    NotFound { name: String },

    #[error("Invalid store name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },
}

impl RegistryError {
    /// True for failures caused by the caller's input rather than registry state.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, RegistryError::InvalidName { .. })
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
