//! Processed image cache
//!
//! Keeps one TTL-bounded table per (repository, format) pair. Each entry
//! points at a file on disk named by its cache key; evicting the entry
//! deletes the file.

mod error;
mod key;
mod store;
mod types;

pub use error::{CacheError, FetchError, Result};
pub use key::cache_key;
pub use store::ImageCacheStore;
pub use types::{CacheEntry, CacheFetch, CacheLookup, CacheStats, StoragePolicy};
