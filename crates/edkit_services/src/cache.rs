//! Bounded request cache
//!
//! Results of network requests are cached by their arguments. Entries keep
//! insertion order so trimming to the size limit always drops the oldest.
//! Network callbacks can land off the main thread, hence the mutex around
//! the shared variant.

use parking_lot::Mutex;

/// Default number of entries kept per cache.
pub const DEFAULT_LIMIT: usize = 20;

/// Insertion-ordered map with a size limit.
///
/// Lookups are linear; caches here hold a couple dozen entries at most.
#[derive(Debug, Clone)]
pub struct CacheMap<K, V> {
    values: Vec<(K, V)>,
    limit: usize,
}

impl<K: PartialEq, V: Clone> CacheMap<K, V> {
    pub fn new(limit: usize) -> Self {
        Self {
            values: Vec::new(),
            limit: limit.max(1),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Insert a value, replacing any entry for the same key and evicting
    /// the oldest entry when full.
    pub fn add(&mut self, key: K, value: V) {
        self.remove(&key);
        if self.values.len() >= self.limit {
            self.values.remove(0);
        }
        self.values.push((key, value));
    }

    pub fn remove(&mut self, key: &K) {
        self.values.retain(|(k, _)| k != key);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Change the size limit. Existing entries are dropped.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(1);
        self.values.clear();
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: PartialEq, V: Clone> Default for CacheMap<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT)
    }
}

/// Thread-safe [`CacheMap`].
#[derive(Debug)]
pub struct SharedCache<K, V> {
    inner: Mutex<CacheMap<K, V>>,
}

impl<K: PartialEq, V: Clone> SharedCache<K, V> {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Mutex::new(CacheMap::new(limit)),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key)
    }

    pub fn add(&self, key: K, value: V) {
        self.inner.lock().add(key, value);
    }

    /// Return the cached value for `key`, or compute, cache and return it.
    ///
    /// The lock is held while `make` runs, so concurrent callers asking for
    /// the same key start the request only once.
    pub fn get_or_insert_with(&self, key: K, make: impl FnOnce(&K) -> V) -> V {
        let mut inner = self.inner.lock();
        if let Some(value) = inner.get(&key) {
            return value;
        }
        let value = make(&key);
        inner.add(key, value.clone());
        value
    }

    pub fn remove(&self, key: &K) {
        self.inner.lock().remove(key);
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn set_limit(&self, limit: usize) {
        self.inner.lock().set_limit(limit);
    }

    pub fn limit(&self) -> usize {
        self.inner.lock().limit()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl<K: PartialEq, V: Clone> Default for SharedCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT)
    }
}
