//! Processed image store with in-memory TTL tables and file-based storage

use crate::error::{FetchError, Result};
use crate::types::{CacheEntry, CacheFetch, CacheLookup, CacheStats, StoragePolicy};
use chrono::Utc;
use image_params::ImageFormat;
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::ops::compute::{CompResult, Op};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

type Table = Cache<String, CacheEntry>;
type TableId = (String, ImageFormat);

/// Generation of the file currently written at each path
type FileOwners = Arc<Mutex<HashMap<PathBuf, u64>>>;

/// Two-level (repository, format) table of TTL caches over files on disk
///
/// Tables are created lazily on first use and live as long as the store.
/// Files are laid out as `<cache_dir>/<repo_id>/<key>`.
pub struct ImageCacheStore {
    cache_dir: PathBuf,
    default_policy: StoragePolicy,
    policies: HashMap<TableId, StoragePolicy>,
    tables: RwLock<HashMap<TableId, Table>>,
    owners: FileOwners,
    next_generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ImageCacheStore {
    /// Create a new store; tables without an explicit policy use `default_policy`
    pub fn new(cache_dir: PathBuf, default_policy: StoragePolicy) -> Self {
        Self {
            cache_dir,
            default_policy,
            policies: HashMap::new(),
            tables: RwLock::new(HashMap::new()),
            owners: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Override the policy of one (repository, format) table
    pub fn with_policy(mut self, repo_id: &str, format: ImageFormat, policy: StoragePolicy) -> Self {
        self.policies.insert((repo_id.to_string(), format), policy);
        self
    }

    /// Ensure the cache directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).await?;
        info!(cache_dir = ?self.cache_dir, "Image cache initialized");
        Ok(())
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn policy_for(&self, repo_id: &str, format: ImageFormat) -> StoragePolicy {
        self.policies
            .get(&(repo_id.to_string(), format))
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Look up a processed image; entries whose file is gone count as a miss
    pub async fn lookup(&self, repo_id: &str, format: ImageFormat, key: &str) -> CacheLookup {
        let table = self.table(repo_id, format).await;

        let Some(entry) = table.get(key).await else {
            // Lets expired entries release their files now rather than on a later write
            table.run_pending_tasks().await;
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(repo = %repo_id, %format, key = %key, "Cache miss");
            return CacheLookup::Miss;
        };

        if !file_exists(&entry.path).await {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(repo = %repo_id, %format, key = %key, "Cached file missing");
            return CacheLookup::Miss;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(repo = %repo_id, %format, key = %key, "Cache hit");
        CacheLookup::Hit {
            path: entry.path,
            content_type: entry.content_type,
        }
    }

    /// Write `bytes` to disk and register the entry, replacing any previous one
    pub async fn store(
        &self,
        repo_id: &str,
        format: ImageFormat,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<CacheEntry> {
        let table = self.table(repo_id, format).await;
        let entry = self.write_entry(repo_id, key, bytes, content_type).await?;
        table.insert(key.to_string(), entry.clone()).await;

        debug!(repo = %repo_id, %format, key = %key, size = entry.size, "Cached image");
        Ok(entry)
    }

    /// Return the cached entry for `key`, or run `produce` and store its output
    ///
    /// Concurrent callers missing on the same key share a single `produce`
    /// run; only the caller that ran it gets the bytes back in
    /// [`CacheFetch::produced`].
    pub async fn get_or_store<F, E>(
        &self,
        repo_id: &str,
        format: ImageFormat,
        key: &str,
        produce: F,
    ) -> std::result::Result<CacheFetch, Arc<FetchError<E>>>
    where
        F: Future<Output = std::result::Result<(Vec<u8>, String), E>>,
        E: Send + Sync + 'static,
    {
        let table = self.table(repo_id, format).await;

        if let Some(entry) = table.get(key).await {
            if file_exists(&entry.path).await {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(repo = %repo_id, %format, key = %key, "Cache hit");
                return Ok(CacheFetch {
                    entry,
                    produced: None,
                });
            }

            debug!(repo = %repo_id, %format, key = %key, "Cached file missing, refilling");
            invalidate_generation(&table, key, entry.generation).await;
        }

        let mut produced = None;
        let slot = &mut produced;
        let entry = table
            .try_get_with(key.to_string(), async move {
                let (bytes, content_type) = produce.await.map_err(FetchError::Produce)?;
                let entry = self
                    .write_entry(repo_id, key, &bytes, &content_type)
                    .await
                    .map_err(FetchError::Cache)?;
                *slot = Some(bytes);
                Ok::<_, FetchError<E>>(entry)
            })
            .await?;

        if produced.is_some() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(repo = %repo_id, %format, key = %key, size = entry.size, "Cache filled");
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(repo = %repo_id, %format, key = %key, "Cache filled by concurrent request");
        }

        Ok(CacheFetch { entry, produced })
    }

    /// Run pending expirations and evictions on every table
    pub async fn run_pending_tasks(&self) {
        let tables: Vec<Table> = self.tables.read().await.values().cloned().collect();
        for table in tables {
            table.run_pending_tasks().await;
        }
    }

    /// Get current cache statistics
    pub async fn stats(&self) -> CacheStats {
        let tables = self.tables.read().await;
        CacheStats {
            tables: tables.len(),
            entries: tables.values().map(|table| table.entry_count()).sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Get or lazily create the table for a (repository, format) pair
    async fn table(&self, repo_id: &str, format: ImageFormat) -> Table {
        let id = (repo_id.to_string(), format);
        if let Some(table) = self.tables.read().await.get(&id) {
            return table.clone();
        }

        let mut tables = self.tables.write().await;
        tables
            .entry(id)
            .or_insert_with_key(|id| self.build_table(id))
            .clone()
    }

    fn build_table(&self, (repo_id, format): &TableId) -> Table {
        let policy = self.policy_for(repo_id, *format);
        let owners = Arc::clone(&self.owners);

        let mut builder = Table::builder().time_to_live(policy.ttl).eviction_listener(
            move |key: Arc<String>, entry: CacheEntry, cause: RemovalCause| {
                if cause.was_evicted() {
                    remove_backing_file(&owners, &key, &entry, cause);
                }
            },
        );
        if let Some(max_entries) = policy.max_entries {
            builder = builder.max_capacity(max_entries);
        }

        debug!(
            repo = %repo_id,
            %format,
            max_entries = ?policy.max_entries,
            ttl_ms = policy.ttl.as_millis() as u64,
            "Created image cache table"
        );
        builder.build()
    }

    async fn write_entry(
        &self,
        repo_id: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<CacheEntry> {
        let dir = self.cache_dir.join(repo_id);
        fs::create_dir_all(&dir).await?;

        let path = dir.join(key);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        // Claim the path before writing so a late eviction of the previous
        // entry cannot delete the new file
        lock_owners(&self.owners).insert(path.clone(), generation);
        fs::write(&path, bytes).await?;

        Ok(CacheEntry {
            key: key.to_string(),
            path,
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
            created_at: Utc::now(),
            generation,
        })
    }
}

fn lock_owners(owners: &Mutex<HashMap<PathBuf, u64>>) -> MutexGuard<'_, HashMap<PathBuf, u64>> {
    owners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Best-effort delete of an evicted entry's file; failures are only logged
fn remove_backing_file(
    owners: &Mutex<HashMap<PathBuf, u64>>,
    key: &str,
    entry: &CacheEntry,
    cause: RemovalCause,
) {
    let mut owners = lock_owners(owners);
    if owners.get(&entry.path) != Some(&entry.generation) {
        debug!(key = %key, ?cause, "Evicted entry no longer owns its file");
        return;
    }
    owners.remove(&entry.path);

    match std::fs::remove_file(&entry.path) {
        Ok(()) => debug!(key = %key, ?cause, "Removed evicted cache file"),
        Err(e) => debug!(key = %key, ?cause, error = %e, "Could not remove evicted cache file"),
    }
}

/// Remove `key` only while it still holds `generation`, so an entry
/// refilled by a concurrent caller stays in place
async fn invalidate_generation(table: &Table, key: &str, generation: u64) -> bool {
    let result = table
        .entry_by_ref(key)
        .and_compute_with(|current| {
            let op = match current {
                Some(current) if current.value().generation == generation => Op::Remove,
                _ => Op::Nop,
            };
            std::future::ready(op)
        })
        .await;
    matches!(result, CompResult::Removed(_))
}

async fn file_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}
