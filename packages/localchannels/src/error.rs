//! Error types for localchannels.

use localchannels_store::StoreError;
use thiserror::Error;

use crate::identity::ChannelId;

/// Errors surfaced to callers of the localchannels API.
///
/// Malformed shared-store values are not represented here: they are
/// replaced by empty defaults and logged where they are read.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The operation needs a connected process.
    #[error("local channel is not connected")]
    NotConnected,

    /// `connect` was called on a process that is already connected.
    #[error("local channel is already connected")]
    AlreadyConnected,

    /// The name is bound to a different identity and rebinding was not requested.
    #[error("local channel name already bound: {0}")]
    NameAlreadyBound(String),

    /// The name is not bound to the identity trying to release it.
    #[error("name not bound to local channel: {0}")]
    NameNotBound(String),

    /// Every identity in the 32-bit space is taken.
    #[error("too many open channels")]
    IdentitySpaceExhausted,

    /// The identity is not part of the local channel set.
    #[error("unknown channel: {0}")]
    UnknownChannel(ChannelId),

    /// The shared store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for localchannels operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
