//! Backend for stores with a change feed.

use localchannels_store::{ChangeEvent, ChangeFeed};

use crate::backend::{drain_signals, NotificationBackend, Notice, Signal};
use crate::bindings::{BindingChange, BindingTable};
use crate::directory::Directory;
use crate::channel::Properties;
use crate::error::Result;
use crate::identity::ChannelId;
use crate::keys::KeyKind;
use crate::shared::{decode_or_default, SharedStoreAdapter};

/// Routes store change events to directory, binding, property and mailbox
/// handling.
///
/// The feed never echoes this process's own writes, so announcing is a
/// no-op and the caller updates its own view at the point of mutation.
pub struct NativeBackend {
    feed: Box<dyn ChangeFeed>,
}

impl NativeBackend {
    pub fn new(feed: Box<dyn ChangeFeed>) -> Self {
        Self { feed }
    }

    fn route(
        &self,
        shared: &mut SharedStoreAdapter,
        self_id: ChannelId,
        change: ChangeEvent,
        signals: &mut Vec<Signal>,
    ) -> Result<()> {
        let Some(kind) = shared.keys().classify(&change.key) else {
            return Ok(());
        };
        let key = change.key.as_str();

        match kind {
            KeyKind::Directory => {
                let directory: Directory = decode_or_default(key, change.new_value.as_deref());
                signals.push(Signal::Channels(directory));
            }
            KeyKind::Bindings => {
                let old: BindingTable = decode_or_default(key, change.old_value.as_deref());
                let new: BindingTable = decode_or_default(key, change.new_value.as_deref());
                signals.extend(old.changes_to(&new).into_iter().map(|change| match change {
                    BindingChange::Bound { id, name } => Signal::Bound { id, name },
                    BindingChange::Unbound { id, name } => Signal::Unbound { id, name },
                }));
            }
            KeyKind::Properties(id) => {
                // Removal only happens on disconnect, which the directory reports.
                if change.new_value.is_some() {
                    let properties: Properties =
                        decode_or_default(key, change.new_value.as_deref());
                    signals.push(Signal::Properties { id, properties });
                }
            }
            KeyKind::Mailbox(id) => {
                if id == self_id && change.new_value.is_some() {
                    signals.extend(drain_signals(shared, self_id)?);
                }
            }
        }
        Ok(())
    }
}

impl NotificationBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn reset(&mut self) {
        let stale = self.feed.take_changes();
        if !stale.is_empty() {
            tracing::debug!(count = stale.len(), "discarding changes observed while disconnected");
        }
    }

    fn announce(
        &mut self,
        _shared: &mut SharedStoreAdapter,
        _source: ChannelId,
        _peers: &[ChannelId],
        _notice: Notice,
    ) -> Result<()> {
        Ok(())
    }

    fn collect(
        &mut self,
        shared: &mut SharedStoreAdapter,
        self_id: ChannelId,
    ) -> Result<Vec<Signal>> {
        let mut signals = Vec::new();
        for change in self.feed.take_changes() {
            let key = change.key.clone();
            if let Err(e) = self.route(shared, self_id, change, &mut signals) {
                tracing::warn!(key = %key, error = %e, "failed to handle store change");
            }
        }
        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyLayout;
    use crate::mailbox::Envelope;
    use localchannels_store::{MemoryStore, SharedStore};
    use serde_json::json;

    const ME: ChannelId = ChannelId::new(0);
    const PEER: ChannelId = ChannelId::new(1);

    fn setup(store: &MemoryStore) -> (SharedStoreAdapter, NativeBackend, SharedStoreAdapter) {
        let own = store.subscribe();
        let shared = SharedStoreAdapter::new(Box::new(own.clone()), KeyLayout::new("t"));
        let backend = NativeBackend::new(Box::new(own));
        let peer = SharedStoreAdapter::new(Box::new(store.handle()), KeyLayout::new("t"));
        (shared, backend, peer)
    }

    #[test]
    fn directory_changes_carry_the_new_snapshot() {
        let store = MemoryStore::new();
        let (mut shared, mut backend, mut peer) = setup(&store);

        let directory: Directory = [ME, PEER].into_iter().collect();
        peer.write_directory(&directory).unwrap();

        let signals = backend.collect(&mut shared, ME).unwrap();
        assert_eq!(signals, vec![Signal::Channels(directory)]);
    }

    #[test]
    fn binding_changes_are_diffed() {
        let store = MemoryStore::new();
        let (mut shared, mut backend, mut peer) = setup(&store);

        let mut bindings = BindingTable::new();
        bindings.bind(PEER, "svc", false).unwrap();
        peer.write_bindings(&bindings).unwrap();
        // A rebind replaces the owner without an unbind.
        bindings.bind(ME, "svc", true).unwrap();
        peer.write_bindings(&bindings).unwrap();
        bindings.unbind(ME, "svc").unwrap();
        peer.write_bindings(&bindings).unwrap();

        let signals = backend.collect(&mut shared, ME).unwrap();
        assert_eq!(
            signals,
            vec![
                Signal::Bound {
                    id: PEER,
                    name: "svc".to_string()
                },
                Signal::Bound {
                    id: ME,
                    name: "svc".to_string()
                },
                Signal::Unbound {
                    id: ME,
                    name: "svc".to_string()
                },
            ]
        );
    }

    #[test]
    fn own_mailbox_writes_trigger_a_drain() {
        let store = MemoryStore::new();
        let (mut shared, mut backend, mut peer) = setup(&store);

        peer.push(ME, &Envelope::message(PEER, json!(1))).unwrap();
        peer.push(ME, &Envelope::message(PEER, json!(2))).unwrap();
        // Other mailboxes are not ours to drain.
        peer.push(PEER, &Envelope::message(ME, json!(3))).unwrap();

        let signals = backend.collect(&mut shared, ME).unwrap();
        assert_eq!(
            signals,
            vec![
                Signal::Message {
                    source: PEER,
                    data: json!(1)
                },
                Signal::Message {
                    source: PEER,
                    data: json!(2)
                },
            ]
        );
        // Our own reset of the mailbox is not echoed back.
        assert!(backend.collect(&mut shared, ME).unwrap().is_empty());
    }

    #[test]
    fn property_writes_and_foreign_keys() {
        let store = MemoryStore::new();
        let (mut shared, mut backend, mut peer) = setup(&store);
        let mut raw = store.handle();

        let mut properties = Properties::new();
        properties.insert("role".to_string(), json!("worker"));
        peer.write_properties(PEER, &properties).unwrap();
        raw.set("unrelated", "1").unwrap();
        raw.remove("t.channel.1.properties").unwrap();

        let signals = backend.collect(&mut shared, ME).unwrap();
        assert_eq!(
            signals,
            vec![Signal::Properties {
                id: PEER,
                properties
            }]
        );
    }

    #[test]
    fn reset_discards_queued_changes() {
        let store = MemoryStore::new();
        let (mut shared, mut backend, mut peer) = setup(&store);

        peer.write_directory(&Directory::new()).unwrap();
        peer.write_directory(&[PEER].into_iter().collect()).unwrap();
        backend.reset();

        assert!(backend.collect(&mut shared, ME).unwrap().is_empty());
    }
}
