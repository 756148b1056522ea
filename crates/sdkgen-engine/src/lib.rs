//! Content-addressed memoization of assembly steps.
//!
//! A query is a value object: a stable hash over its type identity and
//! fields, plus a `run` operation. The engine executes queries at most once
//! per key within a process, persists successful results in a disk-backed
//! store shared between processes, and re-validates on read that a cached
//! artifact still exists.

pub mod hash;
pub mod output;
pub mod store;

pub use hash::{CacheKey, HashEncodable, HashEncoder};
pub use output::QueryOutput;
pub use store::{CacheIndex, CacheRecord, StoreError};

use async_trait::async_trait;
use sdkgen_fs::FileSystem;
use sdkgen_http::HttpClient;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A memoizable unit of work.
///
/// Queries are value objects: they hold only immutable configuration, never
/// runtime state, and reach all I/O through the engine passed to `run`.
/// Sub-queries go through [`QueryEngine::execute`] so they memoize too.
#[async_trait]
pub trait Query: HashEncodable + Send + Sync {
    /// Stable type identity, conventionally `module.TypeName`.
    fn type_name(&self) -> &'static str;

    /// Produce this query's output. Only invoked on a cache miss.
    async fn run(&self, engine: &QueryEngine) -> anyhow::Result<QueryOutput>;
}

/// The memoizing executor.
pub struct QueryEngine {
    fs: Arc<dyn FileSystem>,
    http: Arc<dyn HttpClient>,
    store: CacheIndex,
    inflight: tokio::sync::Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryEngine {
    /// Create an engine over a cache directory.
    pub fn new(
        fs: Arc<dyn FileSystem>,
        http: Arc<dyn HttpClient>,
        cache_dir: &camino::Utf8Path,
    ) -> anyhow::Result<Self> {
        let store = CacheIndex::open(cache_dir)?;
        Ok(Self {
            fs,
            http,
            store,
            inflight: tokio::sync::Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    #[must_use]
    pub fn http(&self) -> &Arc<dyn HttpClient> {
        &self.http
    }

    /// The key a query hashes to.
    #[must_use]
    pub fn cache_key(&self, query: &dyn Query) -> CacheKey {
        let mut encoder = HashEncoder::new();
        encoder.encode_type_name(query.type_name());
        query.encode(&mut encoder);
        encoder.finalize()
    }

    /// Cache hits observed so far.
    #[must_use]
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Cache misses (actual executions) observed so far.
    #[must_use]
    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Execute a query through the cache.
    ///
    /// Identical concurrent calls serialize on a per-key lock, so `run` is
    /// invoked exactly once; distinct keys proceed in parallel. Failed runs
    /// are never recorded, so the next invocation retries.
    pub async fn execute(&self, query: &dyn Query) -> anyhow::Result<QueryOutput> {
        let key = self.cache_key(query);
        let entry_lock = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(key)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let _running = entry_lock.lock().await;

        if let Some(record) = self.lookup(&key).await? {
            let valid = match record.output.as_path() {
                Some(path) => self.fs.exists(path).await,
                None => true,
            };
            if valid {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, query = query.type_name(), "cache hit");
                return Ok(record.output);
            }
            // The artifact vanished out from under the record; evict and
            // re-run.
            tracing::debug!(key = %key, query = query.type_name(), "evicting stale cache record");
            self.evict(&key).await?;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, query = query.type_name(), "cache miss, running");
        let output = query.run(self).await?;
        self.persist(&key, &output).await?;
        Ok(output)
    }

    async fn lookup(&self, key: &CacheKey) -> anyhow::Result<Option<CacheRecord>> {
        let store = self.store.clone();
        let key = *key;
        Ok(tokio::task::spawn_blocking(move || store.get(&key)).await??)
    }

    async fn persist(&self, key: &CacheKey, output: &QueryOutput) -> anyhow::Result<()> {
        let store = self.store.clone();
        let key = *key;
        let output = output.clone();
        tokio::task::spawn_blocking(move || store.insert(&key, &output)).await??;
        Ok(())
    }

    async fn evict(&self, key: &CacheKey) -> anyhow::Result<()> {
        let store = self.store.clone();
        let key = *key;
        tokio::task::spawn_blocking(move || store.remove(&key)).await??;
        Ok(())
    }
}
