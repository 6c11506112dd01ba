//! Local channels: discovery, naming and messaging between processes that
//! share nothing but a key-value store.
//!
//! Every participating process connects to get a numeric [`ChannelId`].
//! It can then:
//!
//! - see every other connected process as a [`Channel`] with published
//!   [`Properties`] and bound names
//! - bind human-readable names to itself, exclusively or by taking them over
//! - post JSON messages to one channel or to every channel matching a
//!   [`Filter`]
//! - listen for connect, disconnect, message, property and binding
//!   [`Event`]s
//!
//! All shared state lives in the store under a configurable namespace (see
//! [`ChannelsConfig`]). How processes learn about each other's writes is up
//! to a [`NotificationBackend`](backend::NotificationBackend): a store change
//! feed when there is one, synthetic mailbox records when there is not.
//!
//! The store offers no atomic updates. Concurrent connects or binds by
//! different processes can race; the last write wins.
//!
//! # Example
//!
//! ```rust
//! use localchannels::{ChannelsConfig, ConnectOptions, Filter, LocalChannels};
//! use localchannels_store::MemoryStore;
//! use serde_json::json;
//!
//! let store = MemoryStore::new();
//! let mut worker = LocalChannels::with_memory_store(&store, ChannelsConfig::default());
//! let mut boss = LocalChannels::with_memory_store(&store, ChannelsConfig::default());
//!
//! worker.connect(ConnectOptions::new()).unwrap();
//! worker.set_property("role", json!("worker")).unwrap();
//! boss.connect(ConnectOptions::new().name("boss")).unwrap();
//!
//! let mut role = localchannels::Properties::new();
//! role.insert("role".to_string(), json!("worker"));
//! let sent = boss
//!     .post_message(json!("start"), Some(&Filter::properties(role)))
//!     .unwrap();
//! assert_eq!(sent, 1);
//! ```

pub mod backend;
mod bindings;
mod channel;
mod config;
mod directory;
mod error;
mod event;
mod filter;
mod hub;
mod identity;
mod keys;
mod mailbox;
mod shared;
mod task;

pub use bindings::{BindingChange, BindingTable};
pub use channel::{Channel, Properties};
pub use config::{ChannelsConfig, NotifyMode};
pub use directory::{Directory, DirectoryDelta};
pub use error::{ChannelError, Result};
pub use event::{Event, EventKind, Listener, ListenerId};
pub use filter::{ChannelPredicate, Filter, NamePattern};
pub use hub::{ConnectOptions, LocalChannels};
pub use identity::{ChannelId, MAX_CHANNEL_ID};
pub use keys::{KeyKind, KeyLayout};
pub use mailbox::Envelope;
pub use shared::SharedStoreAdapter;
