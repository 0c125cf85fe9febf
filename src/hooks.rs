//! Connection hooks: optional callbacks an embedder registers to be
//! notified once per accepted connection, before its worker starts
//! serving lines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::lock::ClientId;

/// A registered connection hook.
pub type ConnectionHook = Arc<dyn Fn(&ClientId) + Send + Sync>;

/// An opaque handle returned by [`HookRegistry::add`], usable to
/// [`HookRegistry::remove`] the hook later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// The set of connection hooks registered on one [`crate::Scpi`]
/// instance. Survives across `close`/`open` cycles, since it is owned by
/// the facade rather than by the listener it's threaded into.
#[derive(Clone)]
pub struct HookRegistry {
    next_id: Arc<AtomicU64>,
    hooks: Arc<Mutex<HashMap<u64, ConnectionHook>>>,
}

impl HookRegistry {
    pub fn new() -> HookRegistry {
        HookRegistry {
            next_id: Arc::new(AtomicU64::new(0)),
            hooks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers `hook`, to be called once per new connection.
    pub fn add(&self, hook: ConnectionHook) -> HookId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.hooks.lock().insert(id, hook);
        HookId(id)
    }

    /// Unregisters a hook. A no-op if `id` is no longer registered.
    pub fn remove(&self, id: HookId) {
        self.hooks.lock().remove(&id.0);
    }

    /// Invokes every registered hook with the newly connected client's identity.
    pub fn notify(&self, client: &ClientId) {
        for hook in self.hooks.lock().values() {
            hook(client);
        }
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        HookRegistry::new()
    }
}
