use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The Store holds every key-value pair in memory. Keys and values are binary safe.
///
/// The store is shared by all connections: it is cloned cheaply through reference counting and
/// every clone sees the same data. Any number of readers may hold the store at the same time while
/// a writer excludes everyone else, see [`Store::read`] and [`Store::write`].
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<State>>,
}

type Key = Bytes;

#[derive(Default)]
pub struct State {
    keys: HashMap<Key, Bytes>,
}

impl Store {
    pub fn new() -> Store {
        Self::default()
    }

    /// Acquires shared access to the store.
    pub fn read(&self) -> StoreRead<'_> {
        // A panic while holding the lock can't leave the map half-updated since every mutation
        // is a single `HashMap` call, so a poisoned lock is still safe to use.
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        StoreRead { state }
    }

    /// Acquires exclusive access to the store.
    pub fn write(&self) -> StoreWrite<'_> {
        let state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        StoreWrite { state }
    }
}

pub struct StoreRead<'a> {
    state: RwLockReadGuard<'a, State>,
}

impl StoreRead<'_> {
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.state.keys.get(key).cloned()
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.state.keys.contains_key(key)
    }

    pub fn size(&self) -> usize {
        self.state.keys.len()
    }
}

pub struct StoreWrite<'a> {
    state: RwLockWriteGuard<'a, State>,
}

impl StoreWrite<'_> {
    pub fn set(&mut self, key: Key, value: Bytes) {
        self.state.keys.insert(key, value);
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Bytes> {
        self.state.keys.remove(key)
    }
}
