use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;

/// Called with each entry evicted for capacity.
pub type ReleaseHook<K, V> = Box<dyn FnMut(K, V)>;

/// A bounded least-recently-used map.
///
/// Both [`RecallCache::get`] and [`RecallCache::set`] refresh recency. When a new key is
/// inserted at capacity, the least recently touched entry is evicted; eviction is silent unless
/// a release hook is installed.
pub struct RecallCache<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
    on_evict: Option<ReleaseHook<K, V>>,
}

impl<K: Hash + Eq, V> RecallCache<K, V> {
    /// A zero `capacity` is raised to one.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "RecallCache: capacity must be positive");
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            on_evict: None,
        }
    }

    pub fn with_release_hook(mut self, hook: impl FnMut(K, V) + 'static) -> Self {
        self.on_evict = Some(Box::new(hook));
        self
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Does not refresh recency.
    pub fn has(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Does not refresh recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.peek(key)
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn set(&mut self, key: K, value: V) {
        let replacing = self.entries.contains(&key);
        let Some((old_key, old_value)) = self.entries.push(key, value) else {
            return;
        };
        if replacing {
            return;
        }
        vtrace!(len = self.entries.len(), "RecallCache: evicted least recently used entry");
        if let Some(hook) = self.on_evict.as_mut() {
            hook(old_key, old_value);
        }
    }

    pub fn delete(&mut self, key: &K) -> Option<V> {
        self.entries.pop(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K: Hash + Eq, V> core::fmt::Debug for RecallCache<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecallCache")
            .field("capacity", &self.capacity())
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}
