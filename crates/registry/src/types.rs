//! Types for the store registry

use crate::errors::{RegistryError, Result};
use kvscope_storage::{KvStore, StorageError};
use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared handle to an open store.
pub type StoreHandle = Arc<dyn KvStore>;

/// Human-chosen store identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreName(String);

impl StoreName {
    /// Validate and wrap a store name.
    ///
    /// Names appear as a single URL path segment, so they must be non-empty
    /// and free of `/`, control characters and surrounding whitespace.
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name.contains('/') {
            Some("name contains '/'")
        } else if name.trim() != name {
            Some("name has surrounding whitespace")
        } else if name.chars().any(char::is_control) {
            Some("name contains control characters")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(RegistryError::InvalidName { name, reason }),
            None => Ok(Self(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for StoreName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is responsible for closing a registered handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// Opened by the registry from `path`; closed on shutdown.
    Owned { path: PathBuf },
    /// Supplied pre-opened by the caller; never closed by the registry.
    Attached,
}

impl Ownership {
    pub fn is_owned(&self) -> bool {
        matches!(self, Ownership::Owned { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Ownership::Owned { path } => Some(path),
            Ownership::Attached => None,
        }
    }
}

/// A registered store
#[derive(Clone)]
pub struct RegistryEntry {
    pub handle: StoreHandle,
    pub ownership: Ownership,
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("ownership", &self.ownership)
            .finish_non_exhaustive()
    }
}

/// Point-in-time description of an entry, without the handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: StoreName,
    pub ownership: Ownership,
}

/// An entry removed by [`crate::StoreRegistry::detach`]
#[derive(Debug)]
pub struct DetachedEntry {
    pub info: EntryInfo,
    /// Set when the registry owned the handle and closing it failed.
    pub close_error: Option<StorageError>,
}

impl DetachedEntry {
    pub fn closed_cleanly(&self) -> bool {
        self.close_error.is_none()
    }
}

/// Outcome of closing the owned stores
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Names whose handles were closed cleanly.
    pub closed: Vec<StoreName>,
    /// Names whose close failed. These entries are removed all the same.
    pub failed: Vec<(StoreName, StorageError)>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
