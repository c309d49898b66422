//! Item store abstraction and the in-memory implementation.
//!
//! The store is the event *source*: the gateway mutates it and then publishes what
//! happened. Every operation runs under one exclusive lock, so concurrent requests
//! never lose updates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{ItemId, ItemPayload, StoreError, StoreResult};

/// Keyed item store.
///
/// Each method is a single atomic step: the existence check and the mutation happen
/// under the same critical section.
pub trait ItemStore: Send + Sync {
    /// Store `item` under `id`; fails with `AlreadyExists` if `id` is present.
    fn insert_new(&self, id: ItemId, item: ItemPayload) -> StoreResult<()>;

    /// Current value for `id`; fails with `NotFound` if absent.
    fn get(&self, id: &ItemId) -> StoreResult<ItemPayload>;

    /// Replace the value for `id`; fails with `NotFound` if absent.
    fn replace(&self, id: ItemId, item: ItemPayload) -> StoreResult<()>;

    /// Remove `id`, returning the last value; fails with `NotFound` if absent.
    fn remove(&self, id: &ItemId) -> StoreResult<ItemPayload>;

    /// Point-in-time copy of every stored item.
    fn snapshot(&self) -> HashMap<ItemId, ItemPayload>;
}

impl<S> ItemStore for Arc<S>
where
    S: ItemStore + ?Sized,
{
    fn insert_new(&self, id: ItemId, item: ItemPayload) -> StoreResult<()> {
        (**self).insert_new(id, item)
    }

    fn get(&self, id: &ItemId) -> StoreResult<ItemPayload> {
        (**self).get(id)
    }

    fn replace(&self, id: ItemId, item: ItemPayload) -> StoreResult<()> {
        (**self).replace(id, item)
    }

    fn remove(&self, id: &ItemId) -> StoreResult<ItemPayload> {
        (**self).remove(id)
    }

    fn snapshot(&self) -> HashMap<ItemId, ItemPayload> {
        (**self).snapshot()
    }
}

/// In-memory item store guarded by a single mutex.
#[derive(Debug, Default)]
pub struct InMemoryItemStore {
    items: Mutex<HashMap<ItemId, ItemPayload>>,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave a half-applied entry: every
    // mutation is a single HashMap call.
    fn lock(&self) -> MutexGuard<'_, HashMap<ItemId, ItemPayload>> {
        self.items.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("item store lock was poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

impl ItemStore for InMemoryItemStore {
    fn insert_new(&self, id: ItemId, item: ItemPayload) -> StoreResult<()> {
        let mut items = self.lock();
        if items.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        items.insert(id, item);
        Ok(())
    }

    fn get(&self, id: &ItemId) -> StoreResult<ItemPayload> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn replace(&self, id: ItemId, item: ItemPayload) -> StoreResult<()> {
        let mut items = self.lock();
        match items.get_mut(&id) {
            Some(slot) => {
                *slot = item;
                Ok(())
            }
            None => Err(StoreError::NotFound(id)),
        }
    }

    fn remove(&self, id: &ItemId) -> StoreResult<ItemPayload> {
        self.lock()
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn snapshot(&self) -> HashMap<ItemId, ItemPayload> {
        self.lock().clone()
    }
}
