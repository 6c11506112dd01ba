//! Local channel proxies.

use serde_json::{Map, Value};

use crate::identity::ChannelId;

/// Properties of one identity: string keys to arbitrary JSON values.
pub type Properties = Map<String, Value>;

/// A local view of one connected identity, this process's own or a remote one.
///
/// Channels are snapshots. They are not authoritative and are re-derived
/// from the shared store whenever one is handed out, except inside
/// disconnect events, where they carry the last state known before the
/// identity left.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    id: ChannelId,
    properties: Properties,
    names: Vec<String>,
}

impl Channel {
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            properties: Properties::new(),
            names: Vec::new(),
        }
    }

    pub(crate) fn with_state(id: ChannelId, properties: Properties, names: Vec<String>) -> Self {
        Self {
            id,
            properties,
            names,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Names bound to this identity, in name order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub(crate) fn set_properties(&mut self, properties: Properties) {
        self.properties = properties;
    }

    pub(crate) fn set_names(&mut self, names: Vec<String>) {
        self.names = names;
    }
}
