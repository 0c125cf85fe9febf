//! Per-connection service loop: one task per accepted socket.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;

use crate::dispatch::dispatch_line;
use crate::lock::{ClientId, Locker};
use crate::tree::Tree;

const RECV_BUFFER: usize = 1024;

/// Serves `stream` until the peer closes it, a read/write fails, or
/// `shutdown` fires. Treats a single `recv` as a single line: a
/// statement fragmented across reads is not reassembled.
pub async fn serve(
    mut stream: TcpStream,
    id: ClientId,
    shutdown: Arc<Notify>,
    tree: Arc<Tree>,
    read_lock: Arc<Locker>,
    write_lock: Option<Arc<Locker>>,
) {
    log::debug!("{}: connected", id);
    let mut buf = [0u8; RECV_BUFFER];

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                log::debug!("{}: closing for shutdown", id);
                break;
            }
            read = stream.read(&mut buf) => {
                match read {
                    Ok(0) => {
                        log::debug!("{}: disconnected", id);
                        break;
                    }
                    Ok(n) => {
                        let line = String::from_utf8_lossy(&buf[..n]);
                        let reply = dispatch_line(
                            &tree,
                            &read_lock,
                            write_lock.as_deref(),
                            &id,
                            &line,
                        );
                        if !reply.is_empty() {
                            if let Err(e) = stream.write_all(reply.as_bytes()).await {
                                log::warn!("{}: write failed: {}", id, e);
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        log::warn!("{}: read failed: {}", id, e);
                        break;
                    }
                }
            }
        }
    }
}
