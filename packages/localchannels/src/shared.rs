//! The single funnel for shared-store access.
//!
//! Every read and write of protocol state goes through
//! [`SharedStoreAdapter`], which keeps the race window in one place: each
//! mutation here is an unguarded read-modify-write on a single key, and a
//! concurrent writer of the same key from another process can overwrite it.
//! That lost-update risk is accepted; the store offers nothing stronger
//! than whole-value get and set.

use localchannels_store::SharedStore;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bindings::BindingTable;
use crate::channel::Properties;
use crate::directory::Directory;
use crate::error::Result;
use crate::identity::ChannelId;
use crate::keys::KeyLayout;
use crate::mailbox::{self, Envelope};

/// Decode a raw stored value, substituting the default when it is absent or
/// malformed. Parse failures are logged, never returned.
pub(crate) fn decode_or_default<T>(key: &str, raw: Option<&str>) -> T
where
    T: DeserializeOwned + Default,
{
    let Some(raw) = raw else {
        return T::default();
    };
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, error = %e, "treating malformed value as absent");
            T::default()
        }
    }
}

fn encode<T: Serialize>(value: &T) -> String {
    // The protocol types are plain maps, arrays and scalars with string keys.
    serde_json::to_string(value).unwrap_or_else(|_| String::from("null"))
}

/// Typed access to the protocol's shared state.
pub struct SharedStoreAdapter {
    store: Box<dyn SharedStore>,
    keys: KeyLayout,
}

impl SharedStoreAdapter {
    pub fn new(store: Box<dyn SharedStore>, keys: KeyLayout) -> Self {
        Self { store, keys }
    }

    pub fn keys(&self) -> &KeyLayout {
        &self.keys
    }

    fn read<T: DeserializeOwned + Default>(&mut self, key: &str) -> Result<T> {
        let raw = self.store.get(key)?;
        Ok(decode_or_default(key, raw.as_deref()))
    }

    fn write<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.store.set(key, &encode(value))?;
        Ok(())
    }

    pub fn read_directory(&mut self) -> Result<Directory> {
        let key = self.keys.directory();
        self.read(&key)
    }

    pub fn write_directory(&mut self, directory: &Directory) -> Result<()> {
        let key = self.keys.directory();
        self.write(&key, directory)
    }

    pub fn read_bindings(&mut self) -> Result<BindingTable> {
        let key = self.keys.bindings();
        self.read(&key)
    }

    pub fn write_bindings(&mut self, bindings: &BindingTable) -> Result<()> {
        let key = self.keys.bindings();
        self.write(&key, bindings)
    }

    pub fn read_properties(&mut self, id: ChannelId) -> Result<Properties> {
        let key = self.keys.properties(id);
        self.read(&key)
    }

    pub fn write_properties(&mut self, id: ChannelId, properties: &Properties) -> Result<()> {
        let key = self.keys.properties(id);
        self.write(&key, properties)
    }

    /// Append one envelope to `id`'s mailbox.
    pub fn push(&mut self, id: ChannelId, envelope: &Envelope) -> Result<()> {
        let key = self.keys.mailbox(id);
        let mut entries: Vec<serde_json::Value> = self.read(&key)?;
        entries.push(serde_json::to_value(envelope).unwrap_or(serde_json::Value::Null));
        self.write(&key, &entries)
    }

    /// Take every envelope pending in `id`'s mailbox, in push order.
    ///
    /// The stored mailbox is reset to empty before anything is returned, so
    /// an envelope is handed out by at most one drain. Envelopes are lost if
    /// the caller fails before processing them.
    pub fn drain(&mut self, id: ChannelId) -> Result<Vec<Envelope>> {
        let key = self.keys.mailbox(id);
        let raw = match self.store.get(&key)? {
            Some(raw) if raw != "[]" => raw,
            _ => return Ok(Vec::new()),
        };
        self.store.set(&key, "[]")?;

        let envelopes = mailbox::decode_mailbox(&key, &raw);
        tracing::debug!(channel = %id, count = envelopes.len(), "drained mailbox");
        Ok(envelopes)
    }

    /// Delete `id`'s properties and mailbox entries.
    pub fn remove_channel_data(&mut self, id: ChannelId) -> Result<()> {
        self.store.remove(&self.keys.mailbox(id))?;
        self.store.remove(&self.keys.properties(id))?;
        Ok(())
    }
}
