//! Single-flight future table
//!
//! The table memoizes one [`RenderFuture`] per key for the current
//! generation. Observing a newer generation drops every entry of the old
//! one wholesale; in-flight work for the old generation keeps running but
//! its futures are never handed out again.

use crate::future::RenderFuture;
use crate::generation::Generation;
use crate::metrics::CacheMetrics;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Result of looking a key up in the table
#[derive(Debug)]
pub enum Entry<T, E> {
    /// The key already had a future in this generation
    Existing(RenderFuture<T, E>),
    /// A new pending future was stored; the caller must start the work
    /// that settles it
    Created(RenderFuture<T, E>),
}

impl<T, E> Entry<T, E> {
    pub fn future(&self) -> &RenderFuture<T, E> {
        match self {
            Entry::Existing(fut) | Entry::Created(fut) => fut,
        }
    }

    pub fn into_future(self) -> RenderFuture<T, E> {
        match self {
            Entry::Existing(fut) | Entry::Created(fut) => fut,
        }
    }
}

struct Bucket<K, T, E> {
    generation: Generation,
    entries: HashMap<K, RenderFuture<T, E>>,
}

/// Memo of render futures keyed by structural identity
pub struct FutureTable<K, T, E> {
    bucket: Mutex<Bucket<K, T, E>>,
    empty: RenderFuture<T, E>,
    metrics: CacheMetrics,
}

impl<K, T, E> FutureTable<K, T, E>
where
    K: Hash + Eq + Clone + fmt::Debug,
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Create a table whose shared "nothing" future settles to `empty`
    pub fn new(empty: T) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                generation: Generation::ZERO,
                entries: HashMap::new(),
            }),
            empty: RenderFuture::ready(empty),
            metrics: CacheMetrics::new("render_cache"),
        }
    }

    /// The single already-settled future returned for absent input
    pub fn empty(&self) -> RenderFuture<T, E> {
        self.empty.clone()
    }

    /// Look up `key` in `generation`, storing a fresh pending future on miss
    ///
    /// A request for an older generation than the table has seen is served
    /// a detached future: it is not stored, so it cannot leak into the
    /// current generation.
    pub fn entry(&self, generation: Generation, key: K) -> Entry<T, E> {
        let mut bucket = self.bucket.lock();

        if generation > bucket.generation {
            if !bucket.entries.is_empty() {
                tracing::debug!(
                    old = %bucket.generation,
                    new = %generation,
                    dropped = bucket.entries.len(),
                    "render cache crossed generation boundary"
                );
            }
            bucket.generation = generation;
            bucket.entries = HashMap::new();
            self.metrics.record_generation();
        } else if generation < bucket.generation {
            self.metrics.record_miss();
            return Entry::Created(RenderFuture::pending());
        }

        if let Some(existing) = bucket.entries.get(&key) {
            self.metrics.record_hit();
            return Entry::Existing(existing.clone());
        }

        self.metrics.record_miss();
        tracing::trace!(?key, %generation, "render cache miss");
        let fut = RenderFuture::pending();
        bucket.entries.insert(key, fut.clone());
        Entry::Created(fut)
    }

    /// Existing future for `key` in `generation`, without creating one
    pub fn get(&self, generation: Generation, key: &K) -> Option<RenderFuture<T, E>> {
        let bucket = self.bucket.lock();
        if bucket.generation != generation {
            return None;
        }
        bucket.entries.get(key).cloned()
    }

    /// The generation currently held
    pub fn generation(&self) -> Generation {
        self.bucket.lock().generation
    }

    /// Number of futures held for the current generation
    pub fn len(&self) -> usize {
        self.bucket.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Drop every entry, keeping the generation
    pub fn clear(&self) {
        self.bucket.lock().entries.clear();
    }
}

impl<K, T, E> fmt::Debug for FutureTable<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bucket = self.bucket.lock();
        f.debug_struct("FutureTable")
            .field("generation", &bucket.generation)
            .field("entries", &bucket.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Table = FutureTable<(String, String), Option<u32>, String>;

    fn key(id: &str, prefix: &str) -> (String, String) {
        (id.to_string(), prefix.to_string())
    }

    #[test]
    fn test_same_key_same_future() {
        let table = Table::new(None);
        let g = Generation(1);

        let first = table.entry(g, key("a", ""));
        assert!(matches!(first, Entry::Created(_)));
        let second = table.entry(g, key("a", ""));
        assert!(matches!(second, Entry::Existing(_)));

        assert!(first.future().ptr_eq(second.future()));
        assert_eq!(table.metrics().snapshot().hits, 1);
    }

    #[test]
    fn test_prefix_is_part_of_key() {
        let table = Table::new(None);
        let g = Generation(1);

        let plain = table.entry(g, key("item", "")).into_future();
        let nested = table.entry(g, key("item", "1")).into_future();
        assert!(!plain.ptr_eq(&nested));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_new_generation_drops_entries() {
        let table = Table::new(None);

        let old = table.entry(Generation(1), key("a", "")).into_future();
        let new = table.entry(Generation(2), key("a", "")).into_future();

        assert!(!old.ptr_eq(&new));
        assert_eq!(table.len(), 1);
        assert_eq!(table.generation(), Generation(2));
        assert!(table.get(Generation(1), &key("a", "")).is_none());
    }

    #[test]
    fn test_stale_generation_is_detached() {
        let table = Table::new(None);
        table.entry(Generation(3), key("a", ""));

        let stale = table.entry(Generation(2), key("b", ""));
        assert!(matches!(stale, Entry::Created(_)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.generation(), Generation(3));
    }

    #[test]
    fn test_empty_sentinel_is_shared() {
        let table = Table::new(None);
        let a = table.empty();
        let b = table.empty();

        assert!(a.ptr_eq(&b));
        assert_eq!(a.peek(), Some(Ok(None)));
    }
}
