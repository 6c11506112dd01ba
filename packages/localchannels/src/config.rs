//! Configuration for a localchannels participant.

use serde::Deserialize;

/// How a participant learns about mutations made by other participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyMode {
    /// The store delivers change events with old and new values.
    #[default]
    Native,
    /// No change events; notifications travel as synthetic mailbox records.
    Compat,
}

/// Configuration for [`LocalChannels`](crate::LocalChannels).
///
/// Every participant sharing a store must use the same `namespace`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Prefix of every key this crate reads or writes.
    pub namespace: String,

    /// Notification strategy.
    pub mode: NotifyMode,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            namespace: "localChannels".to_string(),
            mode: NotifyMode::Native,
        }
    }
}

impl ChannelsConfig {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_mode(mut self, mode: NotifyMode) -> Self {
        self.mode = mode;
        self
    }
}
