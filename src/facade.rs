//! The embedder-facing entry point: a single [`Scpi`] instance owns a
//! command tree, its locks, and the listener that serves it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::ScpiConfig;
use crate::error::{Error, Result};
use crate::hooks::{ConnectionHook, HookId, HookRegistry};
use crate::lock::Locker;
use crate::net::Listener;
use crate::tree::{ReadCb, Tree, WriteCb};

/// The four data formats a reading can be returned in, matching the
/// values accepted by the `DataFormat` attribute installed on every
/// instance.
pub const DATA_FORMATS: &[&str] = &["ASCII", "QUADRUPLE", "DOUBLE", "SINGLE", "HALF"];

/// An SCPI command tree plus the TCP listener that serves it.
///
/// Installed eagerly by [`Scpi::new`]: a `DataFormat` attribute, and the
/// `:SYSTem:LOCK` (and, if `write_lock_enabled`, `:SYSTem:WLOCK`) wire
/// surface handled by the dispatcher.
pub struct Scpi {
    tree: Arc<Tree>,
    read_lock: Arc<Locker>,
    write_lock: Option<Arc<Locker>>,
    listener: Listener,
    config: Mutex<ScpiConfig>,
    data_format: Arc<Mutex<String>>,
    hooks: HookRegistry,
}

impl Scpi {
    /// Builds a new instance and installs its ambient attributes. Does
    /// not bind a socket — call [`Scpi::open`] for that.
    pub fn new(config: ScpiConfig) -> Result<Scpi> {
        let tree = Arc::new(Tree::new());
        let read_lock = Arc::new(Locker::new(config.lock_timeout));
        let write_lock = if config.write_lock_enabled {
            Some(Arc::new(Locker::new(config.lock_timeout)))
        } else {
            None
        };
        let data_format = Arc::new(Mutex::new("ASCII".to_string()));

        let scpi = Scpi {
            tree,
            read_lock,
            write_lock,
            listener: Listener::new(),
            config: Mutex::new(config),
            data_format,
            hooks: HookRegistry::new(),
        };
        scpi.install_data_format()?;
        Ok(scpi)
    }

    fn install_data_format(&self) -> Result<()> {
        let store = self.data_format.clone();
        let read_cb: ReadCb = Arc::new(move |_: &[u32], _: Option<&str>| Ok(store.lock().clone()));
        let store = self.data_format.clone();
        let write_cb: WriteCb = Arc::new(move |_: &[u32], value: &str| {
            *store.lock() = value.to_uppercase();
            Ok(())
        });
        self.tree.add_command(
            "DataFormat",
            read_cb,
            Some(write_cb),
            false,
            Some(DATA_FORMATS.iter().map(|s| s.to_string()).collect()),
        )
    }

    /// The command tree, for registering components/attributes/commands.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn add_component(&self, name: &str, parent: &str) -> Result<()> {
        self.tree.add_component(name, parent)
    }

    pub fn add_channel(&self, name: &str, count: u32, parent: &str, first: u32) -> Result<()> {
        self.tree.add_channel(name, count, parent, first)
    }

    pub fn add_attribute(
        &self,
        name: &str,
        parent: &str,
        read_cb: ReadCb,
        write_cb: Option<WriteCb>,
        default: bool,
        allowed_argins: Option<Vec<String>>,
    ) -> Result<()> {
        self.tree
            .add_attribute(name, parent, read_cb, write_cb, default, allowed_argins)
    }

    pub fn add_command(
        &self,
        full_name: &str,
        read_cb: ReadCb,
        write_cb: Option<WriteCb>,
        default: bool,
        allowed_argins: Option<Vec<String>>,
    ) -> Result<()> {
        self.tree
            .add_command(full_name, read_cb, write_cb, default, allowed_argins)
    }

    pub fn add_special_command(
        &self,
        name: &str,
        read_cb: ReadCb,
        write_cb: Option<WriteCb>,
    ) -> Result<()> {
        self.tree.add_special_command(name, read_cb, write_cb)
    }

    /// The data format last set via `DataFormat` (or the `ASCII` default).
    pub fn data_format(&self) -> String {
        self.data_format.lock().clone()
    }

    /// Sets the data format directly, bypassing the wire attribute.
    /// Rejects any value not in [`DATA_FORMATS`].
    pub fn set_data_format(&self, value: &str) -> Result<()> {
        let upper = value.to_uppercase();
        if !DATA_FORMATS.contains(&upper.as_str()) {
            return Err(Error::Argument(format!("{}: not a recognized data format", value)));
        }
        *self.data_format.lock() = upper;
        Ok(())
    }

    /// The current owner of the read lock, if any.
    pub fn lock_owner(&self) -> Option<String> {
        self.read_lock.owner().map(|id| id.to_string())
    }

    /// The current owner of the write lock, if write locking is enabled.
    pub fn wlock_owner(&self) -> Option<String> {
        self.write_lock
            .as_ref()
            .and_then(|l| l.owner())
            .map(|id| id.to_string())
    }

    /// Dispatches a single wire line directly, without going through a
    /// socket. Exposed for embedders that drive their own transport.
    pub fn dispatch(&self, client_ip: std::net::IpAddr, client_port: u16, line: &str) -> String {
        let client = crate::lock::ClientId::new(client_ip, client_port);
        crate::dispatch::dispatch_line(
            &self.tree,
            &self.read_lock,
            self.write_lock.as_deref(),
            &client,
            line,
        )
    }

    /// Binds and starts serving. IPv6 binding failure is logged and
    /// non-fatal; IPv4 binding failure (after retries) is returned.
    pub async fn open(&self) -> Result<()> {
        let config = self.config.lock().clone();
        self.listener
            .open(
                &config,
                self.tree.clone(),
                self.read_lock.clone(),
                self.write_lock.clone(),
                self.hooks.clone(),
            )
            .await
    }

    /// Signals shutdown and waits for every in-flight connection to drain.
    pub async fn close(&self) {
        self.listener.close().await
    }

    /// The idle timeout configured for both lockers.
    pub fn lock_timeout(&self) -> Duration {
        self.config.lock().lock_timeout
    }

    /// Whether the listener currently accepts connections from remote
    /// addresses rather than loopback only.
    pub fn remote_allowed(&self) -> bool {
        !self.config.lock().bind_local
    }

    /// Toggles remote access: tears down the listener and its workers,
    /// flips `bind_local`, then rebinds. Connections in flight when this
    /// is called are drained by the teardown like any other `close`.
    pub async fn set_remote_allowed(&self, allowed: bool) -> Result<()> {
        self.listener.close().await;
        self.config.lock().bind_local = !allowed;
        self.open().await
    }

    /// Registers a callback invoked once per new connection, with the
    /// connecting client's identity. Returns a handle usable to remove it.
    pub fn add_connection_hook(&self, hook: ConnectionHook) -> HookId {
        self.hooks.add(hook)
    }

    /// Unregisters a connection hook. A no-op if it was already removed.
    pub fn remove_connection_hook(&self, id: HookId) {
        self.hooks.remove(id)
    }
}
