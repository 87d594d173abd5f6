//! Two-tier error catalog cache.
//!
//! In-memory indexes by code and by key, hydrated from a durable snapshot when
//! one is fresh and refreshed from the network otherwise.
//!
//! # Refresh
//!
//! At most one network refresh runs at a time. The refresh is a spawned task
//! behind a [`Shared`] future; every caller arriving while it runs awaits the
//! same result. Both indexes are rebuilt into one [`CatalogIndex`] and swapped
//! in under a single lock, so no reader sees one index ahead of the other.
//!
//! # Durable snapshot
//!
//! ```text
//! scope "error-catalog"
//!   catalog.entries     # JSON list of entries
//!   catalog.timestamp   # population time, ms since epoch
//! ```
//!
//! Writes happen in background tasks that run strictly one after another.
//! A snapshot without its timestamp record is ignored.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::CatalogConfig;
use crate::error::{CatalogError, CatalogResult, StoreError, StoreResult};
use crate::fetcher::{CatalogSource, HttpCatalogFetcher};
use crate::store::KvStore;
use crate::types::CatalogEntry;

/// Store scope for the catalog snapshot.
pub const SNAPSHOT_SCOPE: &str = "error-catalog";

/// Key of the persisted entry list.
pub const ENTRIES_KEY: &str = "catalog.entries";

/// Key of the persisted population timestamp.
pub const TIMESTAMP_KEY: &str = "catalog.timestamp";

type SharedRefresh = Shared<BoxFuture<'static, CatalogResult<()>>>;
type BackgroundTask = Shared<BoxFuture<'static, ()>>;

/// Lookup indexes built from one catalog snapshot.
#[derive(Debug, Default, Clone)]
pub struct CatalogIndex {
    by_code: HashMap<i64, Arc<CatalogEntry>>,
    by_key: HashMap<String, Arc<CatalogEntry>>,
}

impl CatalogIndex {
    /// Index every entry that has a message and at least one identifier.
    /// Later duplicates replace earlier ones.
    pub fn build(entries: &[CatalogEntry]) -> Self {
        let mut index = Self::default();
        for entry in entries {
            if entry.display_message().is_none() {
                continue;
            }
            let key = entry.error_key.as_deref().filter(|k| !k.is_empty());
            if entry.code.is_none() && key.is_none() {
                continue;
            }

            let shared = Arc::new(entry.clone());
            if let Some(code) = entry.code {
                index.by_code.insert(code, Arc::clone(&shared));
            }
            if let Some(key) = key {
                index.by_key.insert(key.to_string(), shared);
            }
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty() && self.by_key.is_empty()
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogStats {
    pub codes: usize,
    pub keys: usize,
    pub populated_at: Option<DateTime<Utc>>,
    pub refreshing: bool,
}

/// A background store operation that failed.
#[derive(Debug, Clone)]
pub struct BackgroundFailure {
    /// `"persist"`, `"clear"` or `"expire"`.
    pub operation: &'static str,
    pub error: StoreError,
}

struct CacheState {
    index: CatalogIndex,
    timestamp: Option<DateTime<Utc>>,
    inflight: Option<(u64, SharedRefresh)>,
    next_refresh_id: u64,
}

struct Inner {
    source: Arc<dyn CatalogSource>,
    store: KvStore,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: Mutex<CacheState>,
    background: Mutex<Option<BackgroundTask>>,
    failures: broadcast::Sender<BackgroundFailure>,
}

/// Error catalog cache. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ErrorCatalog {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ErrorCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorCatalog")
            .field("source", &self.inner.source)
            .field("store", &self.inner.store)
            .field("ttl", &self.inner.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}

impl ErrorCatalog {
    /// Create a catalog with the wall clock and the default 24h TTL.
    pub fn new(source: Arc<dyn CatalogSource>, store: KvStore) -> Self {
        Self::with_components(
            source,
            store,
            Arc::new(SystemClock),
            CatalogConfig::default().ttl(),
        )
    }

    /// Create a catalog with every dependency supplied.
    pub fn with_components(
        source: Arc<dyn CatalogSource>,
        store: KvStore,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        let (failures, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Inner {
                source,
                store,
                clock,
                ttl,
                state: Mutex::new(CacheState {
                    index: CatalogIndex::default(),
                    timestamp: None,
                    inflight: None,
                    next_refresh_id: 0,
                }),
                background: Mutex::new(None),
                failures,
            }),
        }
    }

    /// Create an HTTP-backed catalog from config.
    ///
    /// An unusable database degrades to running without persistence.
    pub fn from_config(config: &CatalogConfig) -> CatalogResult<Self> {
        let fetcher = HttpCatalogFetcher::from_config(config)?;
        let store = match config.resolved_store_path() {
            Some(path) => KvStore::open_or_disabled(&path, SNAPSHOT_SCOPE),
            None => KvStore::disabled(),
        };
        Ok(Self::with_components(
            Arc::new(fetcher),
            store,
            Arc::new(SystemClock),
            config.ttl(),
        ))
    }

    /// Make sure the catalog is loaded and within its TTL.
    ///
    /// Without `force_refresh`: an empty cache is first hydrated from a fresh
    /// durable snapshot, and a populated fresh cache returns immediately.
    /// Otherwise the catalog is fetched, joining a refresh already in flight.
    /// A failed fetch leaves the current indexes untouched.
    pub async fn init_catalog(&self, force_refresh: bool) -> CatalogResult<()> {
        if !force_refresh {
            let empty = self.inner.lock_state().index.is_empty();
            if empty && self.hydrate(true).await {
                return Ok(());
            }
        }

        if !force_refresh && self.is_fresh() {
            return Ok(());
        }

        self.refresh().await
    }

    /// Whether the code index holds at least one entry.
    pub fn is_initialized(&self) -> bool {
        !self.inner.lock_state().index.by_code.is_empty()
    }

    /// Drop the in-memory catalog and schedule deletion of the durable snapshot.
    pub fn clear_cache(&self) {
        {
            let mut state = self.inner.lock_state();
            state.index = CatalogIndex::default();
            state.timestamp = None;
        }
        info!("error catalog cleared");
        self.inner.schedule_snapshot_delete();
    }

    pub fn by_code(&self, code: i64) -> Option<Arc<CatalogEntry>> {
        self.inner.lock_state().index.by_code.get(&code).cloned()
    }

    pub fn by_key(&self, key: &str) -> Option<Arc<CatalogEntry>> {
        self.inner.lock_state().index.by_key.get(key).cloned()
    }

    pub fn stats(&self) -> CatalogStats {
        let state = self.inner.lock_state();
        CatalogStats {
            codes: state.index.by_code.len(),
            keys: state.index.by_key.len(),
            populated_at: state.timestamp,
            refreshing: state.inflight.is_some(),
        }
    }

    /// Populate an empty cache from a fresh durable snapshot. Touches neither
    /// the network nor the stored records; an expired snapshot is left in
    /// place. Returns whether the cache holds a catalog afterwards.
    pub async fn restore_from_store(&self) -> bool {
        let empty = self.inner.lock_state().index.is_empty();
        if !empty {
            return true;
        }
        self.hydrate(false).await
    }

    /// Wait for every background store operation scheduled so far.
    pub async fn flush_background(&self) {
        let task = self.inner.lock_background().clone();
        if let Some(task) = task {
            task.await;
        }
    }

    /// Receive failures of background store operations.
    pub fn subscribe_background_failures(&self) -> broadcast::Receiver<BackgroundFailure> {
        self.inner.failures.subscribe()
    }

    fn is_fresh(&self) -> bool {
        let state = self.inner.lock_state();
        match state.timestamp {
            Some(ts) => !state.index.is_empty() && !self.inner.is_expired(ts),
            None => false,
        }
    }

    /// Populate from the durable snapshot. Returns `true` if it was used.
    /// With `expire_stale`, an expired snapshot is scheduled for deletion.
    async fn hydrate(&self, expire_stale: bool) -> bool {
        let (entries, persisted_at) = match self.inner.load_snapshot(expire_stale).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "failed to read persisted catalog, falling back to network");
                return false;
            }
        };

        let index = CatalogIndex::build(&entries);
        if index.is_empty() {
            debug!("persisted catalog has no usable entries");
            return false;
        }

        let mut state = self.inner.lock_state();
        if !state.index.is_empty() {
            // A refresh finished while the store was being read.
            return false;
        }
        debug!(
            codes = index.by_code.len(),
            keys = index.by_key.len(),
            persisted_at = %persisted_at,
            "error catalog hydrated from store"
        );
        state.index = index;
        state.timestamp = Some(persisted_at);
        true
    }

    async fn refresh(&self) -> CatalogResult<()> {
        let flight = {
            let mut state = self.inner.lock_state();
            match state.inflight.as_ref().map(|(_, flight)| flight.clone()) {
                Some(flight) => {
                    debug!("joining in-flight catalog refresh");
                    flight
                }
                None => {
                    let id = state.next_refresh_id;
                    state.next_refresh_id += 1;

                    let task = tokio::spawn(Inner::run_refresh(Arc::clone(&self.inner), id));
                    let inner = Arc::clone(&self.inner);
                    let flight = async move {
                        match task.await {
                            Ok(result) => result,
                            Err(e) => {
                                inner.finish_flight(id);
                                Err(CatalogError::Refresh {
                                    message: e.to_string(),
                                })
                            }
                        }
                    }
                    .boxed()
                    .shared();

                    state.inflight = Some((id, flight.clone()));
                    flight
                }
            }
        };

        flight.await
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_background(&self) -> MutexGuard<'_, Option<BackgroundTask>> {
        self.background.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Outside `[populated_at, populated_at + ttl)`. A timestamp ahead of the
    /// clock counts as expired.
    fn is_expired(&self, populated_at: DateTime<Utc>) -> bool {
        let age = self.clock.now() - populated_at;
        age < Duration::zero() || age >= self.ttl
    }

    fn finish_flight(&self, id: u64) {
        let mut state = self.lock_state();
        if matches!(&state.inflight, Some((current, _)) if *current == id) {
            state.inflight = None;
        }
    }

    async fn run_refresh(inner: Arc<Inner>, id: u64) -> CatalogResult<()> {
        let result = inner.source.fetch_entries().await;

        let mut state = inner.lock_state();
        if matches!(&state.inflight, Some((current, _)) if *current == id) {
            state.inflight = None;
        }

        match result {
            Ok(entries) => {
                let index = CatalogIndex::build(&entries);
                let now = inner.clock.now();
                info!(
                    entries = entries.len(),
                    codes = index.by_code.len(),
                    keys = index.by_key.len(),
                    "error catalog refreshed"
                );
                state.index = index;
                state.timestamp = Some(now);
                drop(state);

                inner.schedule_persist(entries, now);
                Ok(())
            }
            Err(e) => {
                drop(state);
                warn!(error = %e, "error catalog refresh failed");
                Err(e)
            }
        }
    }

    async fn load_snapshot(
        &self,
        expire_stale: bool,
    ) -> StoreResult<Option<(Vec<CatalogEntry>, DateTime<Utc>)>> {
        if !self.store.is_enabled() {
            return Ok(None);
        }

        let Some(millis) = self.store.get::<i64>(TIMESTAMP_KEY).await? else {
            return Ok(None);
        };
        let persisted_at = match Utc.timestamp_millis_opt(millis).single() {
            Some(ts) if !self.is_expired(ts) => ts,
            _ => {
                debug!(persisted_ms = millis, "persisted catalog expired");
                if expire_stale {
                    self.schedule_expired_delete(millis);
                }
                return Ok(None);
            }
        };

        let entries = self.store.get::<Vec<CatalogEntry>>(ENTRIES_KEY).await?;
        Ok(entries.map(|entries| (entries, persisted_at)))
    }

    fn schedule_persist(&self, entries: Vec<CatalogEntry>, populated_at: DateTime<Utc>) {
        if !self.store.is_enabled() {
            return;
        }
        let store = self.store.clone();
        self.schedule("persist", async move {
            // List first: a missing timestamp invalidates whatever list is there.
            store.set(ENTRIES_KEY, &entries).await?;
            store
                .set(TIMESTAMP_KEY, &populated_at.timestamp_millis())
                .await?;
            debug!(entries = entries.len(), "error catalog persisted");
            Ok(())
        });
    }

    fn schedule_snapshot_delete(&self) {
        if !self.store.is_enabled() {
            return;
        }
        let store = self.store.clone();
        self.schedule("clear", async move {
            store.delete(TIMESTAMP_KEY).await?;
            store.delete(ENTRIES_KEY).await?;
            Ok(())
        });
    }

    /// Delete the snapshot stamped `millis`, unless a newer one replaced it
    /// before this job ran.
    fn schedule_expired_delete(&self, millis: i64) {
        if !self.store.is_enabled() {
            return;
        }
        let store = self.store.clone();
        self.schedule("expire", async move {
            let removed = store
                .delete_if_unchanged(TIMESTAMP_KEY, &millis, &[TIMESTAMP_KEY, ENTRIES_KEY])
                .await?;
            if !removed {
                debug!(persisted_ms = millis, "expired catalog already replaced");
            }
            Ok(())
        });
    }

    /// Run `job` after every previously scheduled job. Failures are logged and
    /// published to background-failure subscribers.
    fn schedule<F>(&self, operation: &'static str, job: F)
    where
        F: Future<Output = StoreResult<()>> + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(operation, "no async runtime, skipping background store operation");
            return;
        };

        let failures = self.failures.clone();
        let mut slot = self.lock_background();
        let previous = slot.clone();

        let handle = runtime.spawn(async move {
            if let Some(previous) = previous {
                previous.await;
            }
            if let Err(error) = job.await {
                warn!(operation, error = %error, "background store operation failed");
                let _ = failures.send(BackgroundFailure { operation, error });
            }
        });

        *slot = Some(handle.map(|_| ()).boxed().shared());
    }
}
