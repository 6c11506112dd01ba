//! Typed events and listener registration.

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde_json::Value;

use crate::channel::{Channel, Properties};
use crate::identity::ChannelId;

/// Something observed about the shared channel space.
///
/// Every event carries the wall-clock time it was created at, which is
/// when this process observed the change, not when it was written.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// An identity appeared in the directory.
    Connect {
        channel: Channel,
        timestamp: SystemTime,
    },
    /// An identity left the directory. `channel` is its last known state.
    Disconnect {
        channel: Channel,
        timestamp: SystemTime,
    },
    /// A payload was delivered to this process. `source` is the sender.
    Message {
        source: Channel,
        data: Value,
        timestamp: SystemTime,
    },
    /// An identity replaced its properties.
    PropertiesChange {
        channel: Channel,
        properties: Properties,
        timestamp: SystemTime,
    },
    /// A name was bound to `channel`.
    Bind {
        channel: Channel,
        name: String,
        timestamp: SystemTime,
    },
    /// A name was released from `channel`.
    Unbind {
        channel: Channel,
        name: String,
        timestamp: SystemTime,
    },
}

/// Discriminant of [`Event`], used to register listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Connect,
    Disconnect,
    Message,
    PropertiesChange,
    Bind,
    Unbind,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connect { .. } => EventKind::Connect,
            Event::Disconnect { .. } => EventKind::Disconnect,
            Event::Message { .. } => EventKind::Message,
            Event::PropertiesChange { .. } => EventKind::PropertiesChange,
            Event::Bind { .. } => EventKind::Bind,
            Event::Unbind { .. } => EventKind::Unbind,
        }
    }

    /// The channel the event is about. For messages, the sender.
    pub fn source(&self) -> &Channel {
        match self {
            Event::Connect { channel, .. }
            | Event::Disconnect { channel, .. }
            | Event::PropertiesChange { channel, .. }
            | Event::Bind { channel, .. }
            | Event::Unbind { channel, .. } => channel,
            Event::Message { source, .. } => source,
        }
    }

    pub fn timestamp(&self) -> SystemTime {
        match self {
            Event::Connect { timestamp, .. }
            | Event::Disconnect { timestamp, .. }
            | Event::Message { timestamp, .. }
            | Event::PropertiesChange { timestamp, .. }
            | Event::Bind { timestamp, .. }
            | Event::Unbind { timestamp, .. } => *timestamp,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::Message => "message",
            EventKind::PropertiesChange => "propertieschange",
            EventKind::Bind => "bind",
            EventKind::Unbind => "unbind",
        };
        f.write_str(name)
    }
}

/// Event handler.
pub type Listener = Box<dyn FnMut(&Event) + Send>;

/// Handle returned by listener registration, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    kind: EventKind,
    listener: Listener,
}

/// Per-channel and global listener lists.
///
/// Dispatch always reaches both scopes: first the listeners of the channel
/// the event is routed to, then the global ones, each in registration order.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    global: Vec<Registration>,
    per_channel: BTreeMap<ChannelId, Vec<Registration>>,
}

impl Listeners {
    fn next_id(&mut self) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn add_global(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = self.next_id();
        self.global.push(Registration { id, kind, listener });
        id
    }

    pub(crate) fn add_channel(
        &mut self,
        channel: ChannelId,
        kind: EventKind,
        listener: Listener,
    ) -> ListenerId {
        let id = self.next_id();
        self.per_channel
            .entry(channel)
            .or_default()
            .push(Registration { id, kind, listener });
        id
    }

    /// Returns `false` if no listener had that id.
    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.global.len();
        self.global.retain(|r| r.id != id);
        if self.global.len() != before {
            return true;
        }
        for registrations in self.per_channel.values_mut() {
            let before = registrations.len();
            registrations.retain(|r| r.id != id);
            if registrations.len() != before {
                return true;
            }
        }
        false
    }

    /// Drop every listener attached to `channel`.
    pub(crate) fn forget_channel(&mut self, channel: ChannelId) {
        self.per_channel.remove(&channel);
    }

    pub(crate) fn forget_all_channels(&mut self) {
        self.per_channel.clear();
    }

    /// Deliver `event` to `target`'s listeners, then to global listeners.
    pub(crate) fn dispatch(&mut self, target: ChannelId, event: &Event) {
        let kind = event.kind();
        tracing::trace!(%kind, channel = %target, "dispatching event");
        if let Some(registrations) = self.per_channel.get_mut(&target) {
            for registration in registrations.iter_mut().filter(|r| r.kind == kind) {
                (registration.listener)(event);
            }
        }
        for registration in self.global.iter_mut().filter(|r| r.kind == kind) {
            (registration.listener)(event);
        }
    }
}
