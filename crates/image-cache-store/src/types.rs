//! Cache types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Metadata for a cached image file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
    pub content_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    /// Write counter value for the file at `path`; eviction only deletes
    /// the file while it still belongs to this entry
    pub generation: u64,
}

/// Result of a plain lookup
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Hit { path: PathBuf, content_type: String },
    Miss,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit { .. })
    }
}

/// Result of a coalesced lookup-or-fill
#[derive(Debug, Clone)]
pub struct CacheFetch {
    pub entry: CacheEntry,
    /// Bytes produced by this caller, `None` when served from the cache or
    /// filled by a concurrent caller
    pub produced: Option<Vec<u8>>,
}

impl CacheFetch {
    pub fn is_hit(&self) -> bool {
        self.produced.is_none()
    }
}

/// Sizing of one (repository, format) table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoragePolicy {
    /// Maximum number of entries, `None` means unbounded
    pub max_entries: Option<u64>,
    pub ttl: Duration,
}

impl Default for StoragePolicy {
    fn default() -> Self {
        Self {
            max_entries: Some(1000),
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub tables: usize,
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
}
