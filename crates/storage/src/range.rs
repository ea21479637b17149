//! Cursor-based, prefix-aware key pagination.
//!
//! A page is computed from live store state on every call. The cursor handed
//! back in [`Page::next_key`] is the first key that was *not* returned, so
//! feeding it back as [`PageRequest::start_key`] resumes exactly where the
//! previous page stopped.

use crate::{KvStore, Result};

/// Page size used when the caller gives none, or an unusable one.
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Parameters of a single page scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub start_key: Option<Vec<u8>>,
    pub prefix: Option<Vec<u8>>,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            start_key: None,
            prefix: None,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl PageRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty keys are treated as absent.
    pub fn with_start_key(mut self, start_key: impl Into<Vec<u8>>) -> Self {
        let start_key: Vec<u8> = start_key.into();
        self.start_key = Some(start_key).filter(|k| !k.is_empty());
        self
    }

    /// Empty prefixes are treated as absent.
    pub fn with_prefix(mut self, prefix: impl Into<Vec<u8>>) -> Self {
        let prefix: Vec<u8> = prefix.into();
        self.prefix = Some(prefix).filter(|p| !p.is_empty());
        self
    }

    /// A zero limit falls back to [`DEFAULT_PAGE_LIMIT`].
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = if limit == 0 { DEFAULT_PAGE_LIMIT } else { limit };
        self
    }

    fn seek_position(&self) -> Option<&[u8]> {
        self.start_key.as_deref().or(self.prefix.as_deref())
    }

    fn admits(&self, key: &[u8]) -> bool {
        self.prefix
            .as_deref()
            .map_or(true, |prefix| key.starts_with(prefix))
    }
}

/// One page of keys plus the cursor for the following page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub keys: Vec<Vec<u8>>,
    /// `None` once the scan is exhausted.
    pub next_key: Option<Vec<u8>>,
}

impl Page {
    pub fn is_last(&self) -> bool {
        self.next_key.is_none()
    }
}

/// Parses a user supplied limit. Missing, unparsable and non-positive
/// values all yield [`DEFAULT_PAGE_LIMIT`].
pub fn parse_limit(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|limit| *limit > 0)
        .and_then(|limit| usize::try_from(limit).ok())
        .unwrap_or(DEFAULT_PAGE_LIMIT)
}

/// Collects at most `request.limit` keys from `store`.
///
/// The scan starts at the first key `>= start_key`, else `>= prefix`, else at
/// the first key. With a prefix set, the first non-matching key ends the scan
/// and is not returned. `next_key` is set whenever the page filled up and
/// another key follows; a zero limit is read as [`DEFAULT_PAGE_LIMIT`].
pub fn scan_page(store: &dyn KvStore, request: &PageRequest) -> Result<Page> {
    let limit = if request.limit == 0 {
        DEFAULT_PAGE_LIMIT
    } else {
        request.limit
    };
    let mut keys = Vec::with_capacity(limit.min(DEFAULT_PAGE_LIMIT));
    let mut iter = store.keys_from(request.seek_position())?;

    let next_key = loop {
        let Some(key) = iter.next().transpose()? else {
            break None;
        };
        // a full page hands out the following key whether or not it matches
        if keys.len() == limit {
            break Some(key);
        }
        if !request.admits(&key) {
            break None;
        }
        keys.push(key);
    };

    tracing::debug!(
        returned = keys.len(),
        limit,
        has_more = next_key.is_some(),
        "scanned key page"
    );

    Ok(Page { keys, next_key })
}
