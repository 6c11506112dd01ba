//! Backend for stores without a change feed.

use crate::backend::{drain_signals, NotificationBackend, Notice, Signal};
use crate::error::Result;
use crate::identity::ChannelId;
use crate::shared::SharedStoreAdapter;

/// Emulates change notifications with synthetic mailbox records.
///
/// Every announced mutation is appended to the mailbox of every known peer.
/// Peers find out when they next drain their own mailbox, so the host must
/// call [`poll`](crate::LocalChannels::poll) periodically.
#[derive(Debug, Default)]
pub struct CompatBackend;

impl CompatBackend {
    pub fn new() -> Self {
        Self
    }
}

impl NotificationBackend for CompatBackend {
    fn name(&self) -> &'static str {
        "compat"
    }

    fn announce(
        &mut self,
        shared: &mut SharedStoreAdapter,
        source: ChannelId,
        peers: &[ChannelId],
        notice: Notice,
    ) -> Result<()> {
        let envelope = notice.into_envelope(source);
        for peer in peers.iter().filter(|peer| **peer != source) {
            shared.push(*peer, &envelope)?;
        }
        Ok(())
    }

    fn collect(
        &mut self,
        shared: &mut SharedStoreAdapter,
        self_id: ChannelId,
    ) -> Result<Vec<Signal>> {
        drain_signals(shared, self_id)
    }
}
