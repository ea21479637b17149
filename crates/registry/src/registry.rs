//! Store registry implementation
//!
//! Maps store names to open handles. All mutations take the write lock, so
//! they are serialized against each other and against enumeration; lookups
//! share the read lock and run concurrently.

use crate::errors::*;
use crate::types::*;
use kvscope_storage::{SledOpener, StoreOpener};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Store Registry
///
/// Owns the name → handle mapping. Handles opened through
/// [`StoreRegistry::register`] are closed by [`StoreRegistry::shutdown`];
/// handles supplied through [`StoreRegistry::attach`] are not.
pub struct StoreRegistry {
    entries: RwLock<BTreeMap<StoreName, RegistryEntry>>,
    opener: Arc<dyn StoreOpener>,
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("entries", &*self.entries.read())
            .finish_non_exhaustive()
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreRegistry {
    /// Create a registry that opens stores with sled
    pub fn new() -> Self {
        Self::with_opener(Arc::new(SledOpener))
    }

    /// Create a registry with a custom opener
    pub fn with_opener(opener: Arc<dyn StoreOpener>) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            opener,
        }
    }

    /// Open the store at `path` and register it as owned.
    ///
    /// Nothing is inserted when the name is taken or the open fails. The
    /// write lock is held across the open so a concurrent registration of the
    /// same name cannot slip in between the check and the insert.
    pub fn register(&self, name: &str, path: impl AsRef<Path>) -> Result<()> {
        let name = StoreName::parse(name)?;
        let path: PathBuf = path.as_ref().to_path_buf();

        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            return Err(RegistryError::NameConflict {
                name: name.to_string(),
            });
        }

        let handle = self
            .opener
            .open(&path)
            .map_err(|source| RegistryError::OpenFailure {
                name: name.to_string(),
                path: path.clone(),
                source,
            })?;

        info!("Registered store '{}' from path: {}", name, path.display());
        entries.insert(
            name,
            RegistryEntry {
                handle,
                ownership: Ownership::Owned { path },
            },
        );
        Ok(())
    }

    /// Register a pre-opened handle. Its lifecycle stays with the caller.
    pub fn attach(&self, name: &str, handle: StoreHandle) -> Result<()> {
        let name = StoreName::parse(name)?;

        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            return Err(RegistryError::NameConflict {
                name: name.to_string(),
            });
        }

        info!("Attached external store '{}'", name);
        entries.insert(
            name,
            RegistryEntry {
                handle,
                ownership: Ownership::Attached,
            },
        );
        Ok(())
    }

    /// Resolve name → handle
    pub fn get(&self, name: &str) -> Result<StoreHandle> {
        let entries = self.entries.read();
        entries
            .get(name)
            .map(|entry| entry.handle.clone())
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Registered names in ascending order
    pub fn names(&self) -> Vec<String> {
        let entries = self.entries.read();
        entries.keys().map(|name| name.to_string()).collect()
    }

    /// Snapshot of every entry's name and ownership
    pub fn entries(&self) -> Vec<EntryInfo> {
        let entries = self.entries.read();
        entries
            .iter()
            .map(|(name, entry)| EntryInfo {
                name: name.clone(),
                ownership: entry.ownership.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove a single entry, closing its handle only if the registry owns it.
    ///
    /// The entry is gone even when closing fails; the close error is carried
    /// in the returned [`DetachedEntry`] so the caller can report it.
    pub fn detach(&self, name: &str) -> Result<DetachedEntry> {
        let (name, entry) = self
            .entries
            .write()
            .remove_entry(name)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })?;

        let mut close_error = None;
        if let Ownership::Owned { path } = &entry.ownership {
            info!("Closing store '{}' at path '{}'", name, path.display());
            if let Err(err) = entry.handle.close() {
                warn!("Failed to close store '{}': {}", name, err);
                close_error = Some(err);
            }
        } else {
            info!("Detached external store '{}'", name);
        }

        Ok(DetachedEntry {
            info: EntryInfo {
                name,
                ownership: entry.ownership,
            },
            close_error,
        })
    }

    /// Close and remove every owned entry. Attached entries stay registered
    /// and usable.
    pub fn shutdown(&self) -> ShutdownReport {
        let mut entries = self.entries.write();
        let owned: Vec<StoreName> = entries
            .iter()
            .filter(|(_, entry)| entry.ownership.is_owned())
            .map(|(name, _)| name.clone())
            .collect();

        let mut report = ShutdownReport::default();
        for name in owned {
            let Some(entry) = entries.remove(&name) else {
                continue;
            };
            let path = entry
                .ownership
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            info!("Closing store '{}' at path '{}'", name, path);
            match entry.handle.close() {
                Ok(()) => report.closed.push(name),
                Err(err) => {
                    warn!("Failed to close store '{}': {}", name, err);
                    report.failed.push((name, err));
                }
            }
        }
        report
    }
}
