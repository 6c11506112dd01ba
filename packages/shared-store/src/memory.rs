//! In-memory shared store with a change feed.
//!
//! Every handle obtained from one [`MemoryStore`] sees the same entries, so
//! several simulated processes in one address space can share state the way
//! real processes share a persistent store.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{ChangeEvent, ChangeFeed, SharedStore, StoreError};

/// Identifies the handle a mutation came from.
type OriginId = u64;

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, String>,
    /// Pending change events per subscribed origin.
    feeds: BTreeMap<OriginId, VecDeque<ChangeEvent>>,
    next_origin: OriginId,
}

impl Inner {
    fn allocate_origin(&mut self) -> OriginId {
        let origin = self.next_origin;
        self.next_origin += 1;
        origin
    }

    fn publish(&mut self, writer: OriginId, event: ChangeEvent) {
        if event.old_value == event.new_value {
            return;
        }
        for (origin, queue) in self.feeds.iter_mut() {
            if *origin != writer {
                queue.push_back(event.clone());
            }
        }
    }
}

/// The shared backing of a family of [`MemoryHandle`]s.
///
/// # Example
///
/// ```rust
/// use localchannels_store::{ChangeFeed, MemoryStore, SharedStore};
///
/// let store = MemoryStore::new();
/// let mut writer = store.subscribe();
/// let mut reader = store.subscribe();
///
/// writer.set("answer", "42").unwrap();
///
/// assert_eq!(reader.get("answer").unwrap(), Some("42".to_string()));
/// assert_eq!(reader.take_changes().len(), 1);
/// // The writer never sees its own write echoed back.
/// assert!(writer.take_changes().is_empty());
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that reads and writes the store but receives no change events.
    pub fn handle(&self) -> MemoryHandle {
        let id = self.lock().allocate_origin();
        self.handle_for(id)
    }

    /// A handle registered on the change feed.
    ///
    /// Events are queued for it from this point on, for every mutation made
    /// through any other handle.
    pub fn subscribe(&self) -> MemoryHandle {
        let mut inner = self.lock();
        let id = inner.allocate_origin();
        inner.feeds.insert(id, VecDeque::new());
        drop(inner);
        self.handle_for(id)
    }

    /// Snapshot of every stored key, in key order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().entries.keys().cloned().collect()
    }

    fn handle_for(&self, id: OriginId) -> MemoryHandle {
        MemoryHandle {
            origin: Arc::new(Origin {
                inner: Arc::clone(&self.inner),
                id,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The origin shared by a handle and its clones. Its feed goes away with
/// the last of them.
struct Origin {
    inner: Arc<Mutex<Inner>>,
    id: OriginId,
}

impl Drop for Origin {
    fn drop(&mut self) {
        lock(&self.inner).feeds.remove(&self.id);
    }
}

/// One participant's connection to a [`MemoryStore`].
///
/// Clones share the origin of the handle they were cloned from: a write made
/// through any clone is not reported to the feed of any other clone.
/// Dropping the last clone unsubscribes.
#[derive(Clone)]
pub struct MemoryHandle {
    origin: Arc<Origin>,
}

impl MemoryHandle {
    /// Stop queueing change events for this handle and its clones.
    pub fn unsubscribe(&self) {
        self.lock().feeds.remove(&self.origin.id);
    }

    /// Whether this handle is registered on the change feed.
    pub fn is_subscribed(&self) -> bool {
        self.lock().feeds.contains_key(&self.origin.id)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.origin.inner)
    }
}

impl SharedStore for MemoryHandle {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let origin = self.origin.id;
        let mut inner = self.lock();
        let old_value = inner.entries.insert(key.to_string(), value.to_string());
        inner.publish(
            origin,
            ChangeEvent {
                key: key.to_string(),
                old_value,
                new_value: Some(value.to_string()),
            },
        );
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let origin = self.origin.id;
        let mut inner = self.lock();
        let old_value = inner.entries.remove(key);
        inner.publish(
            origin,
            ChangeEvent {
                key: key.to_string(),
                old_value,
                new_value: None,
            },
        );
        Ok(())
    }
}

impl ChangeFeed for MemoryHandle {
    fn take_changes(&mut self) -> Vec<ChangeEvent> {
        let origin = self.origin.id;
        match self.lock().feeds.get_mut(&origin) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }
}
