use crate::{KeyIter, KvStore, Result, StorageError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory testing backend
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys_from(&self, start: Option<&[u8]>) -> Result<KeyIter<'_>> {
        self.ensure_open()?;
        let lower = match start {
            Some(start) => Bound::Included(start.to_vec()),
            None => Bound::Unbounded,
        };
        Ok(Box::new(MemoryKeyCursor { store: self, lower }))
    }

    fn flush(&self) -> Result<()> {
        self.ensure_open()
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

/// Re-seeks on every step so no lock is held between items.
struct MemoryKeyCursor<'a> {
    store: &'a MemoryStore,
    lower: Bound<Vec<u8>>,
}

impl Iterator for MemoryKeyCursor<'_> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(err) = self.store.ensure_open() {
            return Some(Err(err));
        }
        let key = {
            let entries = self.store.entries.read();
            entries
                .range::<Vec<u8>, _>((self.lower.clone(), Bound::Unbounded))
                .next()
                .map(|(k, _)| k.clone())?
        };
        self.lower = Bound::Excluded(key.clone());
        Some(Ok(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_observes_keys_inserted_ahead_of_it() {
        let store = MemoryStore::new();
        store.put(b"a", b"1").unwrap();
        store.put(b"c", b"3").unwrap();

        let mut keys = store.keys_from(None).unwrap();
        assert_eq!(keys.next().unwrap().unwrap(), b"a".to_vec());
        store.put(b"b", b"2").unwrap();
        assert_eq!(keys.next().unwrap().unwrap(), b"b".to_vec());
        assert_eq!(keys.next().unwrap().unwrap(), b"c".to_vec());
        assert!(keys.next().is_none());
    }

    #[test]
    fn close_is_one_shot() {
        let store = MemoryStore::new();
        store.close().unwrap();
        assert!(store.is_closed());
        assert!(matches!(store.put(b"k", b"v"), Err(StorageError::Closed)));
        assert!(matches!(store.close(), Err(StorageError::Closed)));
    }
}
