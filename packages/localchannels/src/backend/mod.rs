//! Notification backends.
//!
//! A backend answers two questions for the rest of the crate: how do other
//! processes learn that this one mutated shared state ([`announce`]), and
//! what has changed since this process last looked ([`collect`]). The core
//! only sees [`Signal`]s, so the two strategies behave the same to callers:
//!
//! - [`NativeBackend`] reads a store change feed carrying old and new
//!   values. Announcing is a no-op because the store itself notifies.
//! - [`CompatBackend`] has no feed. Announcing appends a synthetic record to
//!   every peer's mailbox, and collecting drains the own mailbox and
//!   re-reads whatever each record points at.
//!
//! [`announce`]: NotificationBackend::announce
//! [`collect`]: NotificationBackend::collect

mod compat;
mod native;

pub use compat::CompatBackend;
pub use native::NativeBackend;

use serde_json::Value;

use crate::channel::Properties;
use crate::directory::Directory;
use crate::error::Result;
use crate::identity::ChannelId;
use crate::mailbox::Envelope;
use crate::shared::SharedStoreAdapter;

/// A local mutation of shared state that other processes must hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The directory was rewritten.
    ChannelsChange,
    /// The announcing identity replaced its properties.
    PropertiesChange,
    /// `name` was bound to the announcing identity.
    Bind { name: String },
    /// `name` was released from the announcing identity.
    Unbind { name: String },
}

impl Notice {
    fn into_envelope(self, source: ChannelId) -> Envelope {
        match self {
            Notice::ChannelsChange => Envelope::ChannelsChange { source },
            Notice::PropertiesChange => Envelope::PropertiesChange { source },
            Notice::Bind { name } => Envelope::Bind { source, name },
            Notice::Unbind { name } => Envelope::Unbind { source, name },
        }
    }
}

/// Something the local view must absorb.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// The directory now holds exactly these identities.
    Channels(Directory),
    Bound { id: ChannelId, name: String },
    Unbound { id: ChannelId, name: String },
    Properties { id: ChannelId, properties: Properties },
    Message { source: ChannelId, data: Value },
}

/// Strategy for propagating and observing shared-state mutations.
pub trait NotificationBackend: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Forget anything observed while the process was not connected.
    fn reset(&mut self) {}

    /// Tell `peers` that `source` performed `notice`.
    fn announce(
        &mut self,
        shared: &mut SharedStoreAdapter,
        source: ChannelId,
        peers: &[ChannelId],
        notice: Notice,
    ) -> Result<()>;

    /// Gather every signal pending for `self_id`, in arrival order.
    fn collect(&mut self, shared: &mut SharedStoreAdapter, self_id: ChannelId)
        -> Result<Vec<Signal>>;
}

impl<T: NotificationBackend + ?Sized> NotificationBackend for Box<T> {
    fn name(&self) -> &'static str {
        self.as_ref().name()
    }

    fn reset(&mut self) {
        self.as_mut().reset()
    }

    fn announce(
        &mut self,
        shared: &mut SharedStoreAdapter,
        source: ChannelId,
        peers: &[ChannelId],
        notice: Notice,
    ) -> Result<()> {
        self.as_mut().announce(shared, source, peers, notice)
    }

    fn collect(
        &mut self,
        shared: &mut SharedStoreAdapter,
        self_id: ChannelId,
    ) -> Result<Vec<Signal>> {
        self.as_mut().collect(shared, self_id)
    }
}

/// Drain `self_id`'s mailbox and turn each envelope into a signal.
///
/// Synthetic records only name what changed; the current value is re-read
/// from the store because the record may be stale by now. A record whose
/// re-read fails is logged and skipped, the remaining ones still count.
pub(crate) fn drain_signals(
    shared: &mut SharedStoreAdapter,
    self_id: ChannelId,
) -> Result<Vec<Signal>> {
    let envelopes = shared.drain(self_id)?;
    let mut signals = Vec::with_capacity(envelopes.len());
    for envelope in envelopes {
        match interpret(shared, envelope) {
            Ok(Some(signal)) => signals.push(signal),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "dropping mailbox record"),
        }
    }
    Ok(signals)
}

fn interpret(shared: &mut SharedStoreAdapter, envelope: Envelope) -> Result<Option<Signal>> {
    let signal = match envelope {
        Envelope::Message { source, data } => Some(Signal::Message { source, data }),
        Envelope::PropertiesChange { source } => Some(Signal::Properties {
            id: source,
            properties: shared.read_properties(source)?,
        }),
        Envelope::ChannelsChange { .. } => Some(Signal::Channels(shared.read_directory()?)),
        Envelope::Bind { source, name } => {
            if shared.read_bindings()?.lookup(&name) == Some(source) {
                Some(Signal::Bound { id: source, name })
            } else {
                tracing::debug!(%source, name = %name, "bind record is stale");
                None
            }
        }
        Envelope::Unbind { source, name } => {
            if shared.read_bindings()?.lookup(&name) != Some(source) {
                Some(Signal::Unbound { id: source, name })
            } else {
                tracing::debug!(%source, name = %name, "unbind record is stale");
                None
            }
        }
    };
    Ok(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::BindingTable;
    use crate::keys::KeyLayout;
    use localchannels_store::MemoryStore;
    use serde_json::json;

    fn adapter(store: &MemoryStore) -> SharedStoreAdapter {
        SharedStoreAdapter::new(Box::new(store.handle()), KeyLayout::new("t"))
    }

    const ME: ChannelId = ChannelId::new(0);
    const PEER: ChannelId = ChannelId::new(1);

    #[test]
    fn records_are_rederived_from_current_state() {
        let store = MemoryStore::new();
        let mut shared = adapter(&store);

        let directory: Directory = [ME, PEER].into_iter().collect();
        shared.write_directory(&directory).unwrap();
        let mut properties = Properties::new();
        properties.insert("v".to_string(), json!(2));
        shared.write_properties(PEER, &properties).unwrap();

        shared
            .push(ME, &Envelope::ChannelsChange { source: PEER })
            .unwrap();
        shared
            .push(ME, &Envelope::PropertiesChange { source: PEER })
            .unwrap();
        shared
            .push(ME, &Envelope::message(PEER, json!("hi")))
            .unwrap();

        let signals = drain_signals(&mut shared, ME).unwrap();
        assert_eq!(
            signals,
            vec![
                Signal::Channels(directory),
                Signal::Properties {
                    id: PEER,
                    properties
                },
                Signal::Message {
                    source: PEER,
                    data: json!("hi")
                },
            ]
        );
        assert!(drain_signals(&mut shared, ME).unwrap().is_empty());
    }

    #[test]
    fn stale_bind_records_are_dropped() {
        let store = MemoryStore::new();
        let mut shared = adapter(&store);

        // PEER announced a bind, but the name has since moved elsewhere.
        let mut bindings = BindingTable::new();
        bindings.bind(ChannelId::new(5), "svc", false).unwrap();
        bindings.bind(PEER, "kept", false).unwrap();
        shared.write_bindings(&bindings).unwrap();

        for name in ["svc", "kept"] {
            shared
                .push(
                    ME,
                    &Envelope::Bind {
                        source: PEER,
                        name: name.to_string(),
                    },
                )
                .unwrap();
        }
        // "kept" is still bound to PEER, so its unbind record is stale.
        for name in ["gone", "kept"] {
            shared
                .push(
                    ME,
                    &Envelope::Unbind {
                        source: PEER,
                        name: name.to_string(),
                    },
                )
                .unwrap();
        }

        let signals = drain_signals(&mut shared, ME).unwrap();
        assert_eq!(
            signals,
            vec![
                Signal::Bound {
                    id: PEER,
                    name: "kept".to_string()
                },
                Signal::Unbound {
                    id: PEER,
                    name: "gone".to_string()
                },
            ]
        );
    }

    #[test]
    fn notices_map_to_synthetic_records() {
        assert_eq!(
            Notice::Bind {
                name: "n".to_string()
            }
            .into_envelope(PEER),
            Envelope::Bind {
                source: PEER,
                name: "n".to_string()
            }
        );
        assert_eq!(
            Notice::ChannelsChange.into_envelope(PEER),
            Envelope::ChannelsChange { source: PEER }
        );
    }
}
