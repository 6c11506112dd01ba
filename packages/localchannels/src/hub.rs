//! The per-process coordinator.
//!
//! `LocalChannels` is responsible for:
//! - Joining and leaving the shared directory
//! - Keeping the local channel set in line with the directory
//! - Binding names, publishing properties and posting messages
//! - Turning backend signals into events for registered listeners

use std::collections::BTreeMap;
use std::time::SystemTime;

use localchannels_store::{ChangeFeed, MemoryStore, SharedStore};
use serde_json::Value;

use crate::backend::{CompatBackend, NativeBackend, NotificationBackend, Notice, Signal};
use crate::bindings::BindingTable;
use crate::channel::{Channel, Properties};
use crate::config::{ChannelsConfig, NotifyMode};
use crate::directory::Directory;
use crate::error::{ChannelError, Result};
use crate::event::{Event, EventKind, ListenerId, Listeners};
use crate::filter::Filter;
use crate::identity::ChannelId;
use crate::keys::KeyLayout;
use crate::mailbox::Envelope;
use crate::shared::SharedStoreAdapter;
use crate::task::{Task, TaskQueue};

/// Options for [`LocalChannels::connect`].
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Name to bind to the new identity.
    pub name: Option<String>,
    /// Take the name over even if another identity holds it.
    pub rebind: bool,
    /// Initial properties to publish.
    pub properties: Option<Properties>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn rebind(mut self, rebind: bool) -> Self {
        self.rebind = rebind;
        self
    }

    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties = Some(properties);
        self
    }
}

/// One process's membership in a shared channel space.
///
/// All operations are synchronous. Nothing happens in the background:
/// notifications from other processes and messages this process sent to
/// itself are only processed when the host calls [`poll`](Self::poll).
///
/// Dropping a connected instance disconnects it. A process that dies
/// without dropping leaves its identity behind in the directory; nothing
/// reclaims it.
///
/// # Example
///
/// ```rust
/// use localchannels::{ChannelsConfig, ConnectOptions, EventKind, LocalChannels};
/// use localchannels_store::MemoryStore;
///
/// let store = MemoryStore::new();
/// let mut a = LocalChannels::with_memory_store(&store, ChannelsConfig::default());
/// let mut b = LocalChannels::with_memory_store(&store, ChannelsConfig::default());
///
/// let a_id = a.connect(ConnectOptions::new().name("svc")).unwrap();
/// b.connect(ConnectOptions::new()).unwrap();
///
/// let svc = b.channel_by_name("svc").unwrap().unwrap();
/// assert_eq!(svc.id(), a_id);
///
/// a.on(EventKind::Message, |event| println!("{:?}", event));
/// b.post_message_to(a_id, serde_json::json!({"hello": "world"})).unwrap();
/// a.poll().unwrap();
/// ```
pub struct LocalChannels {
    config: ChannelsConfig,
    shared: SharedStoreAdapter,
    backend: Box<dyn NotificationBackend>,
    self_id: Option<ChannelId>,
    channels: BTreeMap<ChannelId, Channel>,
    listeners: Listeners,
    tasks: TaskQueue,
}

impl LocalChannels {
    /// Create a disconnected participant over `store`, notified by `backend`.
    pub fn new(
        store: Box<dyn SharedStore>,
        backend: Box<dyn NotificationBackend>,
        config: ChannelsConfig,
    ) -> Self {
        let keys = KeyLayout::new(config.namespace.clone());
        Self {
            config,
            shared: SharedStoreAdapter::new(store, keys),
            backend,
            self_id: None,
            channels: BTreeMap::new(),
            listeners: Listeners::default(),
            tasks: TaskQueue::default(),
        }
    }

    /// Participant on a store handle that also provides a change feed.
    ///
    /// The handle is cloned: one copy reads and writes, the other listens.
    /// Both must share an origin so this process's writes are not echoed.
    pub fn native<H>(handle: H, config: ChannelsConfig) -> Self
    where
        H: SharedStore + ChangeFeed + Clone + 'static,
    {
        let backend = NativeBackend::new(Box::new(handle.clone()));
        Self::new(Box::new(handle), Box::new(backend), config)
    }

    /// Participant on a store without change feed.
    pub fn compat<S>(store: S, config: ChannelsConfig) -> Self
    where
        S: SharedStore + 'static,
    {
        Self::new(Box::new(store), Box::new(CompatBackend::new()), config)
    }

    /// Participant on a [`MemoryStore`], with the backend picked by
    /// `config.mode`.
    pub fn with_memory_store(store: &MemoryStore, config: ChannelsConfig) -> Self {
        match config.mode {
            NotifyMode::Native => Self::native(store.subscribe(), config),
            NotifyMode::Compat => Self::compat(store.handle(), config),
        }
    }

    pub fn config(&self) -> &ChannelsConfig {
        &self.config
    }

    /// This process's identity, if connected.
    pub fn self_id(&self) -> Option<ChannelId> {
        self.self_id
    }

    pub fn is_connected(&self) -> bool {
        self.self_id.is_some()
    }

    fn require_connected(&self) -> Result<ChannelId> {
        self.self_id.ok_or(ChannelError::NotConnected)
    }

    /// Join the shared channel space.
    ///
    /// Allocates an identity, publishes it in the directory, then binds
    /// `options.name` and publishes `options.properties` if given. A name
    /// conflict is detected before anything is written.
    pub fn connect(&mut self, options: ConnectOptions) -> Result<ChannelId> {
        if self.self_id.is_some() {
            return Err(ChannelError::AlreadyConnected);
        }
        self.backend.reset();

        let mut directory = self.shared.read_directory()?;
        let id = directory.allocate()?;

        let bindings = match &options.name {
            Some(name) => {
                let mut bindings = self.shared.read_bindings()?;
                bindings.bind(id, name, options.rebind)?;
                Some(bindings)
            }
            None => None,
        };

        self.channels = directory
            .iter()
            .map(|known| (known, Channel::new(known)))
            .collect();
        self.channels.insert(id, Channel::new(id));
        self.self_id = Some(id);

        directory.insert(id);
        if let Err(e) = self.shared.write_directory(&directory) {
            self.reset_local_state();
            return Err(e);
        }

        // The identity is public from here on; a failure must withdraw it.
        if let Err(e) = self.publish_connection(bindings, options) {
            tracing::warn!(channel = %id, error = %e, "connect failed, withdrawing identity");
            if let Err(cleanup) = self.release_shared_state(id) {
                tracing::error!(channel = %id, error = %cleanup, "failed to withdraw identity");
            }
            self.reset_local_state();
            return Err(e);
        }

        tracing::debug!(
            channel = %id,
            peers = self.channels.len() - 1,
            backend = self.backend.name(),
            "connected"
        );
        Ok(id)
    }

    fn publish_connection(
        &mut self,
        bindings: Option<BindingTable>,
        options: ConnectOptions,
    ) -> Result<()> {
        self.announce(Notice::ChannelsChange)?;

        if let (Some(bindings), Some(name)) = (bindings, options.name) {
            self.shared.write_bindings(&bindings)?;
            self.announce(Notice::Bind { name })?;
        }

        if let Some(properties) = options.properties {
            self.set_properties(properties)?;
        }
        Ok(())
    }

    /// Leave the shared channel space.
    ///
    /// Releases every name bound to this identity, removes it from the
    /// directory and deletes its properties and mailbox. The local view is
    /// reset even if a store write fails; the failure is still returned.
    pub fn disconnect(&mut self) -> Result<()> {
        let id = self.require_connected()?;
        let result = self.release_shared_state(id);

        let dropped_tasks = self.tasks.len();
        self.reset_local_state();

        tracing::debug!(channel = %id, dropped_tasks, "disconnected");
        result
    }

    fn reset_local_state(&mut self) {
        self.self_id = None;
        self.channels.clear();
        self.listeners.forget_all_channels();
        self.tasks.clear();
    }

    fn release_shared_state(&mut self, id: ChannelId) -> Result<()> {
        let mut bindings = self.shared.read_bindings()?;
        let released = bindings.release_all(id);
        if !released.is_empty() {
            self.shared.write_bindings(&bindings)?;
            for name in released {
                self.announce(Notice::Unbind { name })?;
            }
        }

        let mut directory = self.shared.read_directory()?;
        if directory.remove(id) {
            self.shared.write_directory(&directory)?;
            self.announce(Notice::ChannelsChange)?;
        }

        self.shared.remove_channel_data(id)
    }

    /// Notify every identity currently in the directory.
    ///
    /// The directory is read fresh rather than taken from the local channel
    /// set, which misses peers that joined since the last poll and may still
    /// hold peers that have left.
    fn announce(&mut self, notice: Notice) -> Result<()> {
        let source = self.require_connected()?;
        let peers: Vec<ChannelId> = self
            .shared
            .read_directory()?
            .iter()
            .filter(|id| *id != source)
            .collect();
        self.backend
            .announce(&mut self.shared, source, &peers, notice)
    }

    /// Re-read `id`'s properties and names, updating the cached channel if
    /// there is one.
    fn refresh(&mut self, id: ChannelId, bindings: &BindingTable) -> Result<Channel> {
        let properties = self.shared.read_properties(id)?;
        let names = bindings.names_of(id);
        match self.channels.get_mut(&id) {
            Some(channel) => {
                channel.set_properties(properties);
                channel.set_names(names);
                Ok(channel.clone())
            }
            None => Ok(Channel::with_state(id, properties, names)),
        }
    }

    fn refresh_one(&mut self, id: ChannelId) -> Result<Channel> {
        let bindings = self.shared.read_bindings()?;
        self.refresh(id, &bindings)
    }

    /// Re-read only `id`'s names. A departing channel deletes its
    /// properties before peers hear about it, so the cached ones are kept as
    /// its last known state.
    fn refresh_names(&mut self, id: ChannelId) -> Result<Channel> {
        let names = self.shared.read_bindings()?.names_of(id);
        match self.channels.get_mut(&id) {
            Some(channel) => {
                channel.set_names(names);
                Ok(channel.clone())
            }
            None => Ok(Channel::with_state(id, Properties::new(), names)),
        }
    }

    /// Channel for this process.
    pub fn self_channel(&mut self) -> Result<Channel> {
        let id = self.require_connected()?;
        self.refresh_one(id)
    }

    /// Channel for `id`, if it is part of the local channel set.
    pub fn channel(&mut self, id: ChannelId) -> Result<Option<Channel>> {
        self.require_connected()?;
        if !self.channels.contains_key(&id) {
            return Ok(None);
        }
        self.refresh_one(id).map(Some)
    }

    /// Channel currently holding `name`, if that identity is known locally.
    pub fn channel_by_name(&mut self, name: &str) -> Result<Option<Channel>> {
        self.require_connected()?;
        let bindings = self.shared.read_bindings()?;
        match bindings.lookup(name) {
            Some(id) if self.channels.contains_key(&id) => self.refresh(id, &bindings).map(Some),
            _ => Ok(None),
        }
    }

    /// Every known channel, this process's own included, optionally filtered.
    pub fn channels(&mut self, filter: Option<&Filter>) -> Result<Vec<Channel>> {
        self.require_connected()?;
        let bindings = self.shared.read_bindings()?;
        let ids: Vec<ChannelId> = self.channels.keys().copied().collect();

        let mut channels = Vec::with_capacity(ids.len());
        for id in ids {
            let channel = self.refresh(id, &bindings)?;
            if filter.map_or(true, |f| f.matches(&channel)) {
                channels.push(channel);
            }
        }
        Ok(channels)
    }

    /// Every bound name whose identity is known locally.
    pub fn bindings(&mut self) -> Result<BTreeMap<String, Channel>> {
        self.require_connected()?;
        let bindings = self.shared.read_bindings()?;

        let mut resolved = BTreeMap::new();
        for (name, id) in bindings.iter() {
            if self.channels.contains_key(&id) {
                resolved.insert(name.to_string(), self.refresh(id, &bindings)?);
            }
        }
        Ok(resolved)
    }

    /// Names currently bound to `id`, whether or not it is known locally.
    pub fn names_of(&mut self, id: ChannelId) -> Result<Vec<String>> {
        self.require_connected()?;
        Ok(self.shared.read_bindings()?.names_of(id))
    }

    /// Replace this process's properties.
    pub fn set_properties(&mut self, properties: Properties) -> Result<()> {
        let id = self.require_connected()?;
        self.shared.write_properties(id, &properties)?;
        if let Some(channel) = self.channels.get_mut(&id) {
            channel.set_properties(properties);
        }
        self.announce(Notice::PropertiesChange)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let id = self.require_connected()?;
        let mut properties = self.shared.read_properties(id)?;
        properties.insert(key.into(), value);
        self.set_properties(properties)
    }

    pub fn remove_property(&mut self, key: &str) -> Result<()> {
        let id = self.require_connected()?;
        let mut properties = self.shared.read_properties(id)?;
        properties.remove(key);
        self.set_properties(properties)
    }

    /// Bind `name` to this process.
    ///
    /// Binding a name this process already holds changes nothing and
    /// notifies nobody. Rebinding a name held by another identity replaces
    /// it silently: peers see a bind for this process and no unbind for the
    /// previous holder.
    ///
    /// # Errors
    ///
    /// [`ChannelError::NameAlreadyBound`] if another identity holds `name`
    /// and `rebind` is false.
    pub fn bind(&mut self, name: &str, rebind: bool) -> Result<()> {
        let id = self.require_connected()?;
        let mut bindings = self.shared.read_bindings()?;
        if bindings.lookup(name) == Some(id) {
            return Ok(());
        }
        bindings.bind(id, name, rebind)?;
        self.shared.write_bindings(&bindings)?;
        self.announce(Notice::Bind {
            name: name.to_string(),
        })
    }

    /// Release `name` from this process.
    ///
    /// # Errors
    ///
    /// [`ChannelError::NameNotBound`] if `name` is not bound to this process.
    pub fn unbind(&mut self, name: &str) -> Result<()> {
        let id = self.require_connected()?;
        let mut bindings = self.shared.read_bindings()?;
        bindings.unbind(id, name)?;
        self.shared.write_bindings(&bindings)?;
        self.announce(Notice::Unbind {
            name: name.to_string(),
        })
    }

    /// Send `data` to every other known channel matching `filter`.
    ///
    /// Channels that have left the directory since the last poll are
    /// skipped. Returns the number of mailboxes written.
    pub fn post_message(&mut self, data: Value, filter: Option<&Filter>) -> Result<usize> {
        let source = self.require_connected()?;
        let mut targets: Vec<ChannelId> = match filter {
            None => self
                .channels
                .keys()
                .copied()
                .filter(|id| *id != source)
                .collect(),
            Some(filter) => self
                .channels(Some(filter))?
                .into_iter()
                .map(|channel| channel.id())
                .filter(|id| *id != source)
                .collect(),
        };
        let live = self.shared.read_directory()?;
        targets.retain(|id| live.contains(*id));

        let envelope = Envelope::message(source, data);
        for target in &targets {
            self.shared.push(*target, &envelope)?;
        }
        Ok(targets.len())
    }

    /// Send `data` to one channel.
    ///
    /// Messages to this process itself are queued and dispatched on the
    /// next [`poll`](Self::poll), never before this call returns.
    pub fn post_message_to(&mut self, id: ChannelId, data: Value) -> Result<()> {
        let source = self.require_connected()?;
        if id == source {
            self.tasks.push(Task::DeliverToSelf { data });
            return Ok(());
        }
        if !self.channels.contains_key(&id) || !self.shared.read_directory()?.contains(id) {
            return Err(ChannelError::UnknownChannel(id));
        }
        self.shared.push(id, &Envelope::message(source, data))
    }

    /// Listen for `kind` events on every channel.
    pub fn on<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.listeners.add_global(kind, Box::new(listener))
    }

    /// Listen for `kind` events routed to channel `id`.
    ///
    /// Messages are routed to the receiving channel, so message listeners
    /// belong on this process's own channel. Listeners on a channel are
    /// dropped when it disconnects.
    pub fn on_channel<F>(&mut self, id: ChannelId, kind: EventKind, listener: F) -> Result<ListenerId>
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.require_connected()?;
        if !self.channels.contains_key(&id) {
            return Err(ChannelError::UnknownChannel(id));
        }
        Ok(self.listeners.add_channel(id, kind, Box::new(listener)))
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn off(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Run deferred tasks, then absorb everything the backend has pending.
    ///
    /// Returns the number of tasks and signals processed. Does nothing
    /// while disconnected.
    pub fn poll(&mut self) -> Result<usize> {
        let Some(self_id) = self.self_id else {
            return Ok(0);
        };

        let tasks = self.tasks.take_ready();
        let mut processed = tasks.len();
        for task in tasks {
            self.run_task(self_id, task);
        }

        let signals = self.backend.collect(&mut self.shared, self_id)?;
        processed += signals.len();
        for signal in signals {
            self.apply(self_id, signal);
        }
        Ok(processed)
    }

    fn run_task(&mut self, self_id: ChannelId, task: Task) {
        match task {
            Task::DeliverToSelf { data } => {
                let source = self
                    .channels
                    .get(&self_id)
                    .cloned()
                    .unwrap_or_else(|| Channel::new(self_id));
                let event = Event::Message {
                    source,
                    data,
                    timestamp: SystemTime::now(),
                };
                self.listeners.dispatch(self_id, &event);
            }
        }
    }

    fn apply(&mut self, self_id: ChannelId, signal: Signal) {
        let result = match signal {
            Signal::Channels(directory) => {
                self.reconcile(self_id, directory);
                Ok(())
            }
            Signal::Bound { id, name } => self.refresh_one(id).map(|channel| {
                let timestamp = SystemTime::now();
                self.listeners.dispatch(id, &Event::Bind { channel, name, timestamp });
            }),
            Signal::Unbound { id, name } => self.refresh_names(id).map(|channel| {
                let timestamp = SystemTime::now();
                self.listeners.dispatch(id, &Event::Unbind { channel, name, timestamp });
            }),
            Signal::Properties { id, properties } => self.update_properties(id, properties),
            Signal::Message { source, data } => self.refresh_one(source).map(|source| {
                let timestamp = SystemTime::now();
                self.listeners
                    .dispatch(self_id, &Event::Message { source, data, timestamp });
            }),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to apply signal");
        }
    }

    fn update_properties(&mut self, id: ChannelId, properties: Properties) -> Result<()> {
        if !self.channels.contains_key(&id) {
            tracing::debug!(channel = %id, "properties change for unknown channel");
            return Ok(());
        }
        let mut channel = self.refresh_one(id)?;
        channel.set_properties(properties.clone());
        if let Some(cached) = self.channels.get_mut(&id) {
            cached.set_properties(properties.clone());
        }
        self.listeners.dispatch(
            id,
            &Event::PropertiesChange {
                channel,
                properties,
                timestamp: SystemTime::now(),
            },
        );
        Ok(())
    }

    /// Bring the local channel set in line with a directory snapshot.
    ///
    /// Disconnect events are dispatched while the departing channels are
    /// still cached. The cache is then swapped for the new set in one step,
    /// and connect events follow.
    fn reconcile(&mut self, self_id: ChannelId, mut directory: Directory) {
        if !directory.contains(self_id) {
            tracing::warn!(channel = %self_id, "directory snapshot lost own identity");
            directory.insert(self_id);
        }

        let delta = directory.delta_from(self.channels.keys());
        if delta.is_empty() {
            return;
        }
        tracing::debug!(joined = ?delta.joined, left = ?delta.left, "reconciling channels");

        let next: BTreeMap<ChannelId, Channel> = directory
            .iter()
            .map(|id| {
                let channel = self
                    .channels
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| Channel::new(id));
                (id, channel)
            })
            .collect();

        for id in &delta.left {
            if let Some(channel) = self.channels.get(id).cloned() {
                let timestamp = SystemTime::now();
                self.listeners
                    .dispatch(*id, &Event::Disconnect { channel, timestamp });
            }
        }

        self.channels = next;
        for id in &delta.left {
            self.listeners.forget_channel(*id);
        }

        for id in delta.joined {
            let channel = match self.refresh_one(id) {
                Ok(channel) => channel,
                Err(e) => {
                    tracing::warn!(channel = %id, error = %e, "failed to read joining channel");
                    Channel::new(id)
                }
            };
            let timestamp = SystemTime::now();
            self.listeners.dispatch(id, &Event::Connect { channel, timestamp });
        }
    }
}

impl Drop for LocalChannels {
    fn drop(&mut self) {
        if self.is_connected() {
            if let Err(e) = self.disconnect() {
                tracing::error!(error = %e, "disconnect on drop failed");
            }
        }
    }
}
