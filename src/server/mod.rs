//! TCP protocol server.
//!
//! Owns the accept loop, the per-connection tasks, and coordinated
//! shutdown: the shutdown signal stops the listener and unblocks every
//! live connection, and `serve` joins all connection tasks before
//! returning.

mod connection;
pub mod protocol;

use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::dict::Dictionary;
use crate::encoding::WireEncoding;

/// SKK dictionary server over TCP.
pub struct Server {
    dict: Arc<Dictionary>,
    encoding: WireEncoding,
    shutdown: watch::Sender<bool>,
    listening: AtomicBool,
    /// Live connections by id, each holding a second handle to the
    /// socket so shutdown can close it out from under its task.
    active: Arc<Mutex<HashMap<u64, std::net::TcpStream>>>,
    next_conn_id: AtomicU64,
}

impl Server {
    /// Create a server over a loaded dictionary.
    pub fn new(dict: Arc<Dictionary>, encoding: WireEncoding) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            dict,
            encoding,
            shutdown,
            listening: AtomicBool::new(false),
            active: Arc::new(Mutex::new(HashMap::new())),
            next_conn_id: AtomicU64::new(0),
        }
    }

    /// Bind `addr` and serve until shutdown or a fatal accept error.
    pub async fn listen(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to listen on [{addr}]"))?;
        if let Ok(local) = listener.local_addr() {
            info!("listening on [{local}]...");
        }
        self.serve(listener).await
    }

    /// Serve connections on an already-bound listener.
    ///
    /// Returns `Ok(())` once shutdown has been signalled and every
    /// connection task has finished.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.listening.store(true, Ordering::SeqCst);
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut conns = JoinSet::new();
        let mut backoff = AcceptBackoff::new();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        backoff.reset();
                        self.spawn_connection(&mut conns, stream, peer);
                    }
                    Err(e) if *self.shutdown.borrow() => {
                        debug!("accept interrupted by shutdown: {e}");
                        break;
                    }
                    Err(e) if is_transient(&e) => {
                        let delay = backoff.next_delay();
                        warn!("transient accept failure, retrying in {delay:?}: {e}");
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => return Err(e).context("accept failed"),
                },
                // Reap finished connections as we go.
                Some(_) = conns.join_next() => {}
            }
        }

        // Stop accepting before draining; shutdown has already
        // force-closed the sockets of anything still blocked in I/O.
        drop(listener);
        let remaining = self.active.lock().len();
        if remaining > 0 {
            info!("waiting for {remaining} active connections");
        }
        while conns.join_next().await.is_some() {}

        Ok(())
    }

    /// Signal the accept loop to stop and force-close every live
    /// connection.
    ///
    /// A no-op on a server that never started listening; idempotent
    /// otherwise.
    pub fn shutdown(&self) {
        if !self.listening.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);

        // Closing the sockets is what actually unblocks the connection
        // tasks: a parked read sees EOF and a parked write fails
        // naturally, even when the client has stopped reading.
        for socket in self.active.lock().values() {
            let _ = socket.shutdown(Shutdown::Both);
        }
    }

    /// Number of currently connected clients.
    pub fn active_connections(&self) -> usize {
        self.active.lock().len()
    }

    fn spawn_connection(&self, conns: &mut JoinSet<()>, stream: TcpStream, peer: SocketAddr) {
        let (stream, closer) = match clone_handle(stream) {
            Ok(pair) => pair,
            Err(e) => {
                warn!("dropping connection from {peer}: {e}");
                return;
            }
        };

        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        self.active.lock().insert(id, closer);

        let dict = self.dict.clone();
        let active = self.active.clone();
        let encoding = self.encoding;
        let shutdown_rx = self.shutdown.subscribe();
        conns.spawn(async move {
            connection::serve(stream, peer, dict, encoding, shutdown_rx).await;
            active.lock().remove(&id);
        });
    }
}

/// Duplicate the socket handle so shutdown can close the connection
/// from outside its task, then hand the stream back to tokio.
fn clone_handle(stream: TcpStream) -> io::Result<(TcpStream, std::net::TcpStream)> {
    let stream = stream.into_std()?;
    let closer = stream.try_clone()?;
    Ok((TcpStream::from_std(stream)?, closer))
}

/// Transient network conditions worth retrying.
///
/// Stands in for the deprecated `Temporary` classification of the
/// original protocol servers: well-known transient syscall results keep
/// the loop alive, everything else is fatal.
pub(crate) fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

/// Exponential backoff for transient accept failures: 5ms doubling to a
/// 1s cap, reset to zero by any successful accept.
struct AcceptBackoff {
    delay: Duration,
}

impl AcceptBackoff {
    const INITIAL: Duration = Duration::from_millis(5);
    const MAX: Duration = Duration::from_secs(1);

    fn new() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    fn next_delay(&mut self) -> Duration {
        self.delay = if self.delay.is_zero() {
            Self::INITIAL
        } else {
            (self.delay * 2).min(Self::MAX)
        };
        self.delay
    }

    fn reset(&mut self) {
        self.delay = Duration::ZERO;
    }
}
