//! Content store: one id map per named source
//!
//! Parsed content is dispatched into the store per source. Every
//! `dispatch`/`replace` produces a new [`SourceMap`] instance and a new
//! [`Generation`]; loading-state updates (`mark_loading`, `mark_error`)
//! change entries without starting a generation. Every mutation wakes
//! tasks waiting in [`ContentStore::changed_since`].

use blocklab_incremental::{Generation, GenerationCounter};
use blocklab_types::{ContentId, IdMap, SourceName, VariantMap};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Loading state of one id within a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingState {
    Ready,
    Loading,
    Error,
}

/// Store entry for one content id
#[derive(Debug, Clone, PartialEq)]
pub struct BlockEntry {
    pub variants: VariantMap,
    pub state: LoadingState,
    pub error: Option<String>,
}

impl BlockEntry {
    pub fn ready(variants: VariantMap) -> Self {
        Self {
            variants,
            state: LoadingState::Ready,
            error: None,
        }
    }

    pub fn loading() -> Self {
        Self {
            variants: VariantMap::new(),
            state: LoadingState::Loading,
            error: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == LoadingState::Ready
    }
}

/// The id map of one source in one generation
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    entries: HashMap<ContentId, BlockEntry>,
}

impl SourceMap {
    pub fn get(&self, id: &ContentId) -> Option<&BlockEntry> {
        self.entries.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ContentId> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ContentId, &BlockEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn merge(&mut self, id_map: IdMap) {
        for (id, variants) in id_map {
            self.entries.insert(id, BlockEntry::ready(variants));
        }
    }
}

/// A consistent, cheap-to-clone view of every source at one point in time
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub generation: Generation,
    pub revision: u64,
    sources: HashMap<SourceName, Arc<SourceMap>>,
}

impl StoreSnapshot {
    pub fn source(&self, name: &SourceName) -> Option<&Arc<SourceMap>> {
        self.sources.get(name)
    }

    pub fn entry(&self, source: &SourceName, id: &ContentId) -> Option<&BlockEntry> {
        self.sources.get(source).and_then(|map| map.get(id))
    }

    pub fn source_names(&self) -> impl Iterator<Item = &SourceName> {
        self.sources.keys()
    }
}

#[derive(Default)]
struct StoreInner {
    generation: Generation,
    sources: HashMap<SourceName, Arc<SourceMap>>,
}

/// Session-wide content store
pub struct ContentStore {
    inner: RwLock<StoreInner>,
    generations: GenerationCounter,
    revision: AtomicU64,
    waiters: Mutex<Vec<Waker>>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            generations: GenerationCounter::new(),
            revision: AtomicU64::new(0),
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Merge `id_map` into `source`, overwriting entries with the same id.
    /// Starts a new generation.
    pub fn dispatch(&self, source: &SourceName, id_map: IdMap) -> Generation {
        let count = id_map.len();
        let generation = {
            let mut inner = self.inner.write();
            let mut map = inner
                .sources
                .get(source)
                .map(|existing| SourceMap::clone(existing))
                .unwrap_or_default();
            map.merge(id_map);
            inner.sources.insert(source.clone(), Arc::new(map));
            inner.generation = self.generations.bump();
            inner.generation
        };
        tracing::info!(%source, entries = count, %generation, "dispatched content");
        self.notify();
        generation
    }

    /// Replace `source` wholesale with `id_map`. Starts a new generation.
    pub fn replace(&self, source: &SourceName, id_map: IdMap) -> Generation {
        let count = id_map.len();
        let generation = {
            let mut inner = self.inner.write();
            let mut map = SourceMap::default();
            map.merge(id_map);
            inner.sources.insert(source.clone(), Arc::new(map));
            inner.generation = self.generations.bump();
            inner.generation
        };
        tracing::info!(%source, entries = count, %generation, "replaced source");
        self.notify();
        generation
    }

    /// Drop a source entirely. Starts a new generation if it existed.
    pub fn remove_source(&self, source: &SourceName) -> Option<Generation> {
        let generation = {
            let mut inner = self.inner.write();
            inner.sources.remove(source)?;
            inner.generation = self.generations.bump();
            inner.generation
        };
        self.notify();
        Some(generation)
    }

    /// Flag `id` as loading in `source`; existing variants are kept
    pub fn mark_loading(&self, source: &SourceName, id: &ContentId) {
        self.update_entry(source, id, |entry| {
            entry.state = LoadingState::Loading;
            entry.error = None;
        });
        tracing::debug!(%source, %id, "marked loading");
    }

    /// Flag `id` as failed in `source`
    pub fn mark_error(&self, source: &SourceName, id: &ContentId, error: impl Into<String>) {
        let error = error.into();
        tracing::warn!(%source, %id, %error, "marked error");
        self.update_entry(source, id, |entry| {
            entry.state = LoadingState::Error;
            entry.error = Some(error);
        });
    }

    fn update_entry(&self, source: &SourceName, id: &ContentId, apply: impl FnOnce(&mut BlockEntry)) {
        {
            let mut inner = self.inner.write();
            let map = inner.sources.entry(source.clone()).or_default();
            let map = Arc::make_mut(map);
            let entry = map
                .entries
                .entry(id.clone())
                .or_insert_with(BlockEntry::loading);
            apply(entry);
        }
        self.notify();
    }

    /// Current generation
    pub fn generation(&self) -> Generation {
        self.inner.read().generation
    }

    /// Number of mutations applied so far
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        // Revision first: the data read below is at least this new
        let revision = self.revision();
        let inner = self.inner.read();
        StoreSnapshot {
            generation: inner.generation,
            revision,
            sources: inner.sources.clone(),
        }
    }

    /// Resolves once the store has been mutated after `revision`
    pub fn changed_since(self: &Arc<Self>, revision: u64) -> StoreChanged {
        StoreChanged {
            store: self.clone(),
            revision,
        }
    }

    fn notify(&self) {
        self.revision.fetch_add(1, Ordering::SeqCst);
        let waiters = std::mem::take(&mut *self.waiters.lock());
        for waker in waiters {
            waker.wake();
        }
    }
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ContentStore")
            .field("generation", &inner.generation)
            .field("sources", &inner.sources.keys().collect::<Vec<_>>())
            .field("revision", &self.revision())
            .finish()
    }
}

/// Future returned by [`ContentStore::changed_since`]
#[derive(Debug)]
pub struct StoreChanged {
    store: Arc<ContentStore>,
    revision: u64,
}

impl Future for StoreChanged {
    type Output = u64;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<u64> {
        let current = self.store.revision();
        if current > self.revision {
            return Poll::Ready(current);
        }

        let mut waiters = self.store.waiters.lock();
        // Re-check under the lock so a concurrent notify is not missed
        let current = self.store.revision();
        if current > self.revision {
            return Poll::Ready(current);
        }
        if !waiters.iter().any(|w| w.will_wake(cx.waker())) {
            waiters.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
