use parking_lot::RwLock;
use sled::Db;
use std::path::{Path, PathBuf};

pub mod memory;
pub mod range;

pub use memory::MemoryStore;
pub use range::{parse_limit, scan_page, Page, PageRequest, DEFAULT_PAGE_LIMIT};

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Failed to open store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: sled::Error,
    },
    #[error("Store handle is closed")]
    Closed,
    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Lazily evaluated ascending key iterator. Dropping it releases the
/// underlying engine cursor.
pub type KeyIter<'a> = Box<dyn Iterator<Item = Result<Vec<u8>>> + Send + 'a>;

/// Abstract ordered key-value store.
///
/// Keys are enumerated in byte-lexicographic ascending order; the pagination
/// in [`range`] depends on it.
pub trait KvStore: Send + Sync {
    /// Point read. `Ok(None)` means the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    /// Upsert.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    /// Removes `key`. Deleting an absent key succeeds.
    fn delete(&self, key: &[u8]) -> Result<()>;
    /// Iterates keys `>= start`, or every key when `start` is `None`.
    fn keys_from(&self, start: Option<&[u8]>) -> Result<KeyIter<'_>>;
    fn flush(&self) -> Result<()>;
    /// Releases engine resources. Later operations fail with
    /// [`StorageError::Closed`].
    fn close(&self) -> Result<()>;
}

/// Turns a filesystem location into an open store handle.
pub trait StoreOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<std::sync::Arc<dyn KvStore>>;
}

/// Opens stores with [`SledStore::open`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SledOpener;

impl StoreOpener for SledOpener {
    fn open(&self, path: &Path) -> Result<std::sync::Arc<dyn KvStore>> {
        Ok(std::sync::Arc::new(SledStore::open(path)?))
    }
}

/// Sled-backed implementation
pub struct SledStore {
    db: RwLock<Option<Db>>,
    path: PathBuf,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = sled::open(&path).map_err(|source| StorageError::Open {
            path: path.clone(),
            source,
        })?;
        tracing::debug!("Opened sled store at {}", path.display());
        Ok(Self::from_db(db, path))
    }

    /// Wraps an already opened sled database.
    pub fn from_db(db: Db, path: PathBuf) -> Self {
        Self {
            db: RwLock::new(Some(db)),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.db.read().is_none()
    }

    fn db(&self) -> Result<Db> {
        self.db.read().as_ref().cloned().ok_or(StorageError::Closed)
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db()?.get(key)?.map(|v| v.to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db()?.insert(key, value)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.db()?.remove(key)?;
        Ok(())
    }

    fn keys_from(&self, start: Option<&[u8]>) -> Result<KeyIter<'_>> {
        let db = self.db()?;
        let iter = match start {
            Some(start) => db.range(start.to_vec()..),
            None => db.iter(),
        };
        Ok(Box::new(iter.keys().map(|k| {
            k.map(|k| k.to_vec()).map_err(StorageError::from)
        })))
    }

    fn flush(&self) -> Result<()> {
        self.db()?.flush()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let db = self.db.write().take().ok_or(StorageError::Closed)?;
        db.flush()?;
        tracing::debug!("Closed sled store at {}", self.path.display());
        // the file lock is released once outstanding iterators drop `db`
        Ok(())
    }
}
