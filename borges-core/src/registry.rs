//! Caches [`Location`] singletons by [`LocationID`] so concurrent callers opening the
//! same archive share one instance (and so share the one mutex that gives it its
//! at-most-one-writer guarantee).
//!
//! Guarded by a single [`parking_lot::Mutex`] rather than a read/write lock split: the
//! `lru` crate's [`LruCache::get`] needs `&mut self` to bump recency, so a literal
//! read-lock-for-reads/write-lock-for-mutation split can't actually be implemented
//! against it. See `DESIGN.md`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use borges_byte_store::ByteStore;

use crate::error::Error;
use crate::ids::LocationID;
use crate::location::Location;

struct RegistryInner {
    /// Every `Location` this registry has opened and not yet discarded, ordered by
    /// recency. Constructed unbounded: capacity is enforced by this module, not by the
    /// cache itself, so that a pinned entry is never the one `LruCache::put`'s built-in
    /// eviction would silently drop.
    cache: LruCache<LocationID, Arc<Location>>,
    /// Ids currently participating in a read-write transaction. Exempt from eviction
    /// regardless of recency.
    pinned: HashSet<LocationID>,
}

/// The location registry: one per [`crate::library::Library`], shared across every
/// [`Location`] it opens.
pub struct Registry {
    store: Arc<dyn ByteStore>,
    capacity: usize,
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub fn new(store: Arc<dyn ByteStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            inner: Mutex::new(RegistryInner {
                cache: LruCache::unbounded(),
                pinned: HashSet::new(),
            }),
        }
    }

    /// Fetch the singleton [`Location`] for `id`, opening `archive_path` the first time
    /// `id` is seen (or if its prior entry had been evicted).
    pub fn get_or_open(&self, id: LocationID, archive_path: impl Into<PathBuf>) -> Result<Arc<Location>, Error> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.cache.get(&id) {
            return Ok(Arc::clone(existing));
        }

        let location = Arc::new(Location::open(self.store.clone(), id.clone(), archive_path)?);
        inner.cache.put(id, Arc::clone(&location));
        enforce_capacity(&mut inner, self.capacity);
        Ok(location)
    }

    /// Exempt `id` from eviction until the matching [`Registry::unpin`]. Called around a
    /// read-write transaction so the registry can never hand a second caller a different
    /// `Location` instance for the same archive mid-transaction. Idempotent.
    pub fn pin(&self, id: &LocationID) {
        self.inner.lock().pinned.insert(id.clone());
    }

    /// Release a previous [`Registry::pin`]. Idempotent.
    pub fn unpin(&self, id: &LocationID) {
        let mut inner = self.inner.lock();
        inner.pinned.remove(id);
        enforce_capacity(&mut inner, self.capacity);
    }

    /// Number of `Location`s currently cached, pinned or not. Test/diagnostic use.
    pub fn len(&self) -> usize {
        self.inner.lock().cache.len()
    }
}

fn enforce_capacity(inner: &mut RegistryInner, capacity: usize) {
    let mut remaining_attempts = inner.cache.len();
    while inner.cache.len() > capacity && remaining_attempts > 0 {
        remaining_attempts -= 1;
        let lru_id = match inner.cache.peek_lru() {
            Some((id, _)) => id.clone(),
            None => break,
        };
        if inner.pinned.contains(&lru_id) {
            // Bump it out of LRU position so the next iteration considers a different
            // candidate instead of looping on the same pinned entry.
            let _ = inner.cache.get(&lru_id);
        } else {
            inner.cache.pop_lru();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use borges_byte_store::FsByteStore;

    fn registry(dir: &std::path::Path, capacity: usize) -> Registry {
        let store: Arc<dyn ByteStore> = Arc::new(FsByteStore::new(dir).unwrap());
        Registry::new(store, capacity)
    }

    #[test]
    fn repeated_lookups_return_the_same_instance() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), 4);
        let a = reg.get_or_open(LocationID::new("a.siva"), "a.siva").unwrap();
        let b = reg.get_or_open(LocationID::new("a.siva"), "a.siva").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn pinned_entries_survive_eviction_pressure() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), 1);
        let pinned_id = LocationID::new("pinned.siva");
        let pinned = reg.get_or_open(pinned_id.clone(), "pinned.siva").unwrap();
        reg.pin(&pinned_id);

        // Opening more archives than capacity would normally evict `pinned`, but it's
        // pinned, so it must stay reachable as the same instance.
        let _a = reg.get_or_open(LocationID::new("a.siva"), "a.siva").unwrap();
        let _b = reg.get_or_open(LocationID::new("b.siva"), "b.siva").unwrap();

        let still_pinned = reg.get_or_open(pinned_id.clone(), "pinned.siva").unwrap();
        assert!(Arc::ptr_eq(&pinned, &still_pinned));
    }

    #[test]
    fn unpinning_makes_an_entry_evictable_again() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), 1);
        let id = LocationID::new("a.siva");
        let first = reg.get_or_open(id.clone(), "a.siva").unwrap();
        reg.pin(&id);
        reg.unpin(&id);

        let _other = reg.get_or_open(LocationID::new("b.siva"), "b.siva").unwrap();
        let reopened = reg.get_or_open(id, "a.siva").unwrap();
        assert!(!Arc::ptr_eq(&first, &reopened));
    }
}
