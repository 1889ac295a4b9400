//! Process-local store backed by hash maps.
//!
//! Mirrors the Redis adapter's observable semantics (empty lists and sets
//! disappear, sizes of absent keys are zero) so engine tests exercise the
//! same edge cases either backend would produce. Handles are cheap clones
//! sharing one state, like a connection manager.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{ListPriority, Store, StoreError};

#[derive(Debug, Default)]
struct Shelves {
    values: HashMap<String, String>,
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashSet<String>>,
}

/// In-memory implementation of the [`Store`] contract.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Shelves>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn shelves(&self) -> MutexGuard<'_, Shelves> {
        // Lock is never held across an await; a poisoned lock only means a
        // panicking test, so keep the data usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.shelves().values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.shelves()
            .values
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut shelves = self.shelves();
        shelves.values.remove(key);
        shelves.lists.remove(key);
        shelves.sets.remove(key);
        Ok(())
    }

    async fn list_push(
        &self,
        key: &str,
        value: &str,
        priority: ListPriority,
    ) -> Result<u64, StoreError> {
        let mut shelves = self.shelves();
        let list = shelves.lists.entry(key.to_string()).or_default();
        match priority {
            ListPriority::Normal => list.push_back(value.to_string()),
            ListPriority::High => list.push_front(value.to_string()),
        }
        Ok(list.len() as u64)
    }

    async fn list_pop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut shelves = self.shelves();
        let Some(list) = shelves.lists.get_mut(key) else {
            return Ok(None);
        };
        let head = list.pop_front();
        if list.is_empty() {
            shelves.lists.remove(key);
        }
        Ok(head)
    }

    async fn list_size(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self.shelves().lists.get(key).map_or(0, |l| l.len() as u64))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.shelves()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut shelves = self.shelves();
        if let Some(set) = shelves.sets.get_mut(key) {
            set.remove(member);
            if set.is_empty() {
                shelves.sets.remove(key);
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .shelves()
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}
