//! Shared key-value store boundary for localchannels.
//!
//! This is the narrow waist the protocol sits on: a store of complete string
//! values addressed by string keys, plus an optional change feed.
//!
//! - [`SharedStore`]: `get`/`set`/`remove` of whole values. No transactions,
//!   no compare-and-swap.
//! - [`ChangeFeed`]: best-effort notification of mutations made by *other*
//!   participants, carrying the old and new raw values.
//!
//! Two implementations are provided:
//!
//! - [`MemoryStore`]: shared in-memory entries with a change feed, for
//!   participants living in one address space (and for tests).
//! - [`DiskStore`]: one file per key, shareable between OS processes, with
//!   no change feed.
//!
//! # Example
//!
//! ```rust
//! use localchannels_store::{MemoryStore, SharedStore};
//!
//! let store = MemoryStore::new();
//! let mut handle = store.handle();
//! handle.set("localChannels.channels", "[0]").unwrap();
//! assert_eq!(
//!     handle.get("localChannels.channels").unwrap().as_deref(),
//!     Some("[0]")
//! );
//! ```

mod disk;
mod error;
mod memory;
mod traits;

pub use disk::DiskStore;
pub use error::StoreError;
pub use memory::{MemoryHandle, MemoryStore};
pub use traits::{ChangeEvent, ChangeFeed, SharedStore};
