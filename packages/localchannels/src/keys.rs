//! Layout of the shared-store keys.

use crate::identity::ChannelId;

/// What a shared-store key holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// The set of connected identities.
    Directory,
    /// The name to identity table.
    Bindings,
    /// One identity's properties.
    Properties(ChannelId),
    /// One identity's pending deliveries.
    Mailbox(ChannelId),
}

/// Derives every key from a namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    namespace: String,
}

impl KeyLayout {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn directory(&self) -> String {
        format!("{}.channels", self.namespace)
    }

    pub fn bindings(&self) -> String {
        format!("{}.bindings", self.namespace)
    }

    pub fn properties(&self, id: ChannelId) -> String {
        format!("{}.channel.{}.properties", self.namespace, id)
    }

    pub fn mailbox(&self, id: ChannelId) -> String {
        format!("{}.channel.{}.mailbox", self.namespace, id)
    }

    /// Map a raw key back to what it holds. Keys outside the namespace, or
    /// with an unknown shape, yield `None`.
    pub fn classify(&self, key: &str) -> Option<KeyKind> {
        let rest = key
            .strip_prefix(self.namespace.as_str())?
            .strip_prefix('.')?;

        match rest {
            "channels" => return Some(KeyKind::Directory),
            "bindings" => return Some(KeyKind::Bindings),
            _ => {}
        }

        let rest = rest.strip_prefix("channel.")?;
        let (id, field) = rest.split_once('.')?;
        let id: ChannelId = id.parse().ok()?;
        match field {
            "properties" => Some(KeyKind::Properties(id)),
            "mailbox" => Some(KeyKind::Mailbox(id)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        let keys = KeyLayout::new("localChannels");
        assert_eq!(keys.directory(), "localChannels.channels");
        assert_eq!(keys.bindings(), "localChannels.bindings");
        assert_eq!(
            keys.properties(ChannelId::new(5)),
            "localChannels.channel.5.properties"
        );
        assert_eq!(
            keys.mailbox(ChannelId::new(5)),
            "localChannels.channel.5.mailbox"
        );
    }

    #[test]
    fn classify_round_trips_layout() {
        let keys = KeyLayout::new("ns");
        let id = ChannelId::new(12);
        assert_eq!(keys.classify(&keys.directory()), Some(KeyKind::Directory));
        assert_eq!(keys.classify(&keys.bindings()), Some(KeyKind::Bindings));
        assert_eq!(
            keys.classify(&keys.properties(id)),
            Some(KeyKind::Properties(id))
        );
        assert_eq!(keys.classify(&keys.mailbox(id)), Some(KeyKind::Mailbox(id)));
    }

    #[test]
    fn classify_rejects_foreign_keys() {
        let keys = KeyLayout::new("ns");
        assert_eq!(keys.classify("other.channels"), None);
        assert_eq!(keys.classify("nschannels"), None);
        assert_eq!(keys.classify("ns.channel.x.mailbox"), None);
        assert_eq!(keys.classify("ns.channel.1.queue"), None);
        assert_eq!(keys.classify("ns.channel.-1.mailbox"), None);
        assert_eq!(keys.classify("ns.channel.1"), None);
    }
}
