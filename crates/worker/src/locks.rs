//! Per-key async locks.
//!
//! Serializes writers of the same entity identity within the process. Keys
//! are acquired in sorted order so two records sharing several identities
//! cannot deadlock, and entries are dropped once nobody holds them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held locks; released on drop.
pub struct KeyGuard<'a> {
    owner: &'a KeyLocks,
    keys: Vec<String>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for every key in `keys`.
    pub async fn acquire(&self, keys: &[String]) -> KeyGuard<'_> {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let lock = self.locks.lock().entry(key.clone()).or_default().clone();
            guards.push(lock.lock_owned().await);
        }

        KeyGuard {
            owner: self,
            keys,
            guards,
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guards.clear();
        let mut locks = self.owner.locks.lock();
        for key in &self.keys {
            if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(key);
            }
        }
    }
}
