//! The TCP listener: binds IPv4 (and, best-effort, IPv6), accepts
//! connections up to `max_clients`, and refuses a second connection from
//! an address already being served.

pub mod connection;

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use socket2::{Domain, Socket, Type};
use tokio::net::TcpListener as TokioTcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::ScpiConfig;
use crate::error::{Error, Result};
use crate::hooks::HookRegistry;
use crate::lock::{ClientId, Locker};
use crate::tree::Tree;

const BIND_RETRIES: u32 = 5;
const BIND_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Owns the accept loop(s) for one `Scpi` instance and the set of
/// currently-served client identities.
pub struct Listener {
    shutdown: Arc<Notify>,
    active: Arc<Mutex<HashSet<ClientId>>>,
    accept_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Listener {
    pub fn new() -> Listener {
        Listener {
            shutdown: Arc::new(Notify::new()),
            active: Arc::new(Mutex::new(HashSet::new())),
            accept_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Binds per `config` and spawns the accept loop(s). An IPv6 bind
    /// failure is logged and treated as non-fatal; an IPv4 bind failure
    /// (after exhausting retries) is returned.
    pub async fn open(
        &self,
        config: &ScpiConfig,
        tree: Arc<Tree>,
        read_lock: Arc<Locker>,
        write_lock: Option<Arc<Locker>>,
        hooks: HookRegistry,
    ) -> Result<()> {
        let v4_addr = if config.bind_local {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        };
        let listener4 = bind_with_retry(SocketAddr::new(v4_addr, config.port), config.max_clients).await?;
        self.spawn_accept_loop(
            listener4,
            config.max_clients,
            tree.clone(),
            read_lock.clone(),
            write_lock.clone(),
            hooks.clone(),
        );

        if config.ipv6_enabled {
            let v6_addr = if config.bind_local {
                IpAddr::V6(Ipv6Addr::LOCALHOST)
            } else {
                IpAddr::V6(Ipv6Addr::UNSPECIFIED)
            };
            match bind_with_retry(SocketAddr::new(v6_addr, config.port), config.max_clients).await {
                Ok(listener6) => {
                    self.spawn_accept_loop(listener6, config.max_clients, tree, read_lock, write_lock, hooks);
                }
                Err(e) => {
                    log::warn!("IPv6 listener not started: {}", e);
                }
            }
        }
        Ok(())
    }

    fn spawn_accept_loop(
        &self,
        listener: TokioTcpListener,
        max_clients: usize,
        tree: Arc<Tree>,
        read_lock: Arc<Locker>,
        write_lock: Option<Arc<Locker>>,
        hooks: HookRegistry,
    ) {
        let shutdown = self.shutdown.clone();
        let active = self.active.clone();
        let local_addr = listener.local_addr().ok();

        let handle = tokio::spawn(async move {
            if let Some(addr) = local_addr {
                log::debug!("listening on {}", addr);
            }
            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        log::debug!("accept loop shutting down");
                        break;
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => {
                                let id = ClientId::new(peer.ip(), peer.port());
                                let mut guard = active.lock();
                                if guard.len() >= max_clients {
                                    log::warn!("refusing {}: at capacity ({})", id, max_clients);
                                    continue;
                                }
                                if !guard.insert(id.clone()) {
                                    log::warn!("refusing {}: already connected", id);
                                    continue;
                                }
                                drop(guard);
                                hooks.notify(&id);

                                let active = active.clone();
                                let shutdown = shutdown.clone();
                                let tree = tree.clone();
                                let read_lock = read_lock.clone();
                                let write_lock = write_lock.clone();
                                let worker_id = id.clone();
                                tokio::spawn(async move {
                                    connection::serve(stream, worker_id.clone(), shutdown, tree, read_lock, write_lock)
                                        .await;
                                    active.lock().remove(&worker_id);
                                });
                            }
                            Err(e) => {
                                log::error!("accept failed: {}", e);
                            }
                        }
                    }
                }
            }
        });
        self.accept_tasks.lock().push(handle);
    }

    /// Signals every accept loop and connection worker to stop, and
    /// waits for them to drain, polling once a second.
    pub async fn close(&self) {
        self.shutdown.notify_waiters();
        loop {
            if self.active.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        let tasks: Vec<_> = self.accept_tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener::new()
    }
}

async fn bind_with_retry(addr: SocketAddr, backlog: usize) -> Result<TokioTcpListener> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match bind_once(addr, backlog) {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                if attempt >= BIND_RETRIES {
                    log::error!("{}: bind failed after {} attempts: {} (no more retries)", addr, attempt, e);
                    return Err(Error::Bind(format!("{}: {}", addr, e)));
                }
                log::warn!(
                    "{}: bind failed: {} (retry in {}s)",
                    addr,
                    e,
                    BIND_RETRY_DELAY.as_secs()
                );
                tokio::time::sleep(BIND_RETRY_DELAY).await;
            }
        }
    }
}

fn bind_once(addr: SocketAddr, backlog: usize) -> std::io::Result<TokioTcpListener> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    if addr.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog.try_into().unwrap_or(i32::MAX))?;
    TokioTcpListener::from_std(socket.into())
}
