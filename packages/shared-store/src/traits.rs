//! Core traits for the shared store boundary.

use crate::StoreError;

/// Whole-value access to a shared key-value store.
///
/// This is the only primitive the protocol builds on: single-key reads and
/// writes of complete string values. There are no transactions and no
/// compare-and-swap, so any read-modify-write cycle built on top of it can
/// lose updates to a concurrent writer of the same key.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Box<dyn SharedStore>`.
pub trait SharedStore: Send {
    /// Read the value stored at `key`.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - Nothing is stored at the key (not an error condition).
    /// * `Ok(Some(value))` - The complete stored value.
    /// * `Err(StoreError)` - The backing medium failed.
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the value stored at `key`.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// A single mutation observed on the shared store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// The key that was written or removed.
    pub key: String,
    /// Value before the mutation, `None` if the key was absent.
    pub old_value: Option<String>,
    /// Value after the mutation, `None` if the key was removed.
    pub new_value: Option<String>,
}

/// Change notifications for mutations made by other store handles.
///
/// A feed never reports the mutations made through itself. Events for one
/// key arrive in write order; there is no ordering guarantee across keys
/// written by different writers.
pub trait ChangeFeed: Send {
    /// Take every change queued since the previous call.
    fn take_changes(&mut self) -> Vec<ChangeEvent>;
}

// Blanket implementations for references and boxes

impl<T: SharedStore + ?Sized> SharedStore for &mut T {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        (*self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        (*self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        (*self).remove(key)
    }
}

impl<T: SharedStore + ?Sized> SharedStore for Box<T> {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        self.as_mut().get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.as_mut().set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.as_mut().remove(key)
    }
}

impl<T: ChangeFeed + ?Sized> ChangeFeed for Box<T> {
    fn take_changes(&mut self) -> Vec<ChangeEvent> {
        self.as_mut().take_changes()
    }
}
