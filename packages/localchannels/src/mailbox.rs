//! Mailbox records.
//!
//! A mailbox is a JSON array of [`Envelope`]s stored under one identity's
//! mailbox key. Senders append; only the owner drains, by reading the whole
//! array and immediately resetting it to empty.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::ChannelId;

/// One pending delivery.
///
/// `Message` carries an application payload. The other variants are the
/// synthetic notifications used when the store has no change feed; they
/// only say *what* changed, never the new value, because the value may be
/// stale by the time the record is drained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    Message { source: ChannelId, data: Value },
    PropertiesChange { source: ChannelId },
    ChannelsChange { source: ChannelId },
    Bind { source: ChannelId, name: String },
    Unbind { source: ChannelId, name: String },
}

impl Envelope {
    pub fn message(source: ChannelId, data: Value) -> Self {
        Envelope::Message { source, data }
    }

    pub fn source(&self) -> ChannelId {
        match self {
            Envelope::Message { source, .. }
            | Envelope::PropertiesChange { source }
            | Envelope::ChannelsChange { source }
            | Envelope::Bind { source, .. }
            | Envelope::Unbind { source, .. } => *source,
        }
    }
}

/// Decode a raw mailbox value.
///
/// A value that is not an array decodes to nothing. Individual entries that
/// do not decode are skipped so one bad record cannot hide the rest.
pub(crate) fn decode_mailbox(key: &str, raw: &str) -> Vec<Envelope> {
    let entries: Vec<Value> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding malformed mailbox");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                tracing::warn!(key, index, error = %e, "skipping malformed mailbox entry");
                None
            }
        })
        .collect()
}
