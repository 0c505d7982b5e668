//! The two-thread event loop: an acceptor thread that owns the listening
//! socket and a reactor thread that owns every accepted connection and the
//! shard store.
//!
//! Grounded on `src/server/conn_manager.hpp` (`acceptConnections`) and
//! `src/server/server.cpp` (`handleRequests`/`readRequestAsync`), reworked
//! from the original's single shared epoll instance plus coroutines onto
//! two `mio::Poll` instances: the acceptor polls only the listener, the
//! reactor polls every connection socket registered through the same
//! `Registry` so accept and per-connection I/O never contend for a lock
//! beyond the brief pending-connection handoff (spec.md §5 "Shared mutable
//! state").

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cachekv_common::wire::{MAX_REQUEST_SIZE, READ_BUFFER_SIZE};
use cachekv_core::ShardSettings;
use cachekv_protocol::{next_frame, resp, FrameKind};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Registry, Token};
use parking_lot::Mutex;

use crate::config::ServerSettings;
use crate::connection::Connection;
use crate::dispatcher::Dispatcher;
use crate::latch::CountdownLatch;
use crate::metrics::{self, Metrics, MetricsSnapshot};

const LISTENER_TOKEN: Token = Token(0);
const POLL_TIMEOUT: Duration = Duration::from_millis(200);
const READ_MAX_ATTEMPTS: u32 = ((MAX_REQUEST_SIZE / READ_BUFFER_SIZE) * 2) as u32;

/// Owns the listening-socket bind address and the running flag that both
/// worker threads and the ctrl-c handler read.
pub struct Server {
    settings: ServerSettings,
    running: Arc<AtomicBool>,
}

impl Server {
    pub fn new(settings: ServerSettings) -> Self {
        Server {
            settings,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A clone of the shutdown flag, for wiring into a signal handler.
    pub fn running_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn run(self) -> anyhow::Result<()> {
        self.run_reporting(|_| {})
    }

    /// Binds, spawns the acceptor and reactor threads, and blocks until
    /// both have shut down. `report_addr` is called once the listener is
    /// bound — tests use it to discover the ephemeral port.
    pub fn run_reporting(self, report_addr: impl FnOnce(SocketAddr)) -> anyhow::Result<()> {
        let addr: SocketAddr = format!("0.0.0.0:{}", self.settings.port).parse()?;
        let mut listener = TcpListener::bind(addr)?;
        report_addr(listener.local_addr()?);

        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;

        let metrics = Metrics::new();
        let (metrics_rx, metrics_handle) = metrics::spawn_publisher(metrics.clone(), self.running.clone());
        // Nothing inside the core consumes metrics snapshots; the channel
        // feeds an external exporter. Dropping the receiver here would
        // close the channel out from under the publisher thread, so it is
        // leaked into a background drain instead.
        spawn_metrics_drain(metrics_rx);

        let pending: Arc<Mutex<VecDeque<Connection>>> = Arc::new(Mutex::new(VecDeque::new()));
        let next_token = Arc::new(AtomicUsize::new(1));
        let latch = Arc::new(CountdownLatch::new(2));

        let acceptor_registry = registry.try_clone()?;
        let acceptor_running = self.running.clone();
        let acceptor_pending = pending.clone();
        let acceptor_tokens = next_token.clone();
        let acceptor_latch = latch.clone();
        let acceptor_metrics = metrics.clone();
        let acceptor_handle = std::thread::Builder::new()
            .name("cachekv-acceptor".into())
            .spawn(move || {
                acceptor_loop(
                    listener,
                    acceptor_registry,
                    acceptor_pending,
                    acceptor_tokens,
                    acceptor_running,
                    acceptor_latch,
                    acceptor_metrics,
                )
            })?;

        let dispatcher = Dispatcher::new(
            self.settings.num_shards.max(1),
            ShardSettings {
                compression_enabled: self.settings.enable_compression,
                ..ShardSettings::default()
            },
            metrics,
        );

        let reactor_running = self.running.clone();
        let reactor_latch = latch.clone();
        let reactor_handle = std::thread::Builder::new()
            .name("cachekv-reactor".into())
            .spawn(move || reactor_loop(poll, pending, dispatcher, reactor_running, reactor_latch))?;

        latch.wait();
        let _ = acceptor_handle.join();
        let _ = reactor_handle.join();
        let _ = metrics_handle.join();
        Ok(())
    }
}

fn spawn_metrics_drain(rx: std::sync::mpsc::Receiver<MetricsSnapshot>) {
    std::thread::Builder::new()
        .name("cachekv-metrics-drain".into())
        .spawn(move || while rx.recv().is_ok() {})
        .expect("failed to spawn metrics drain thread");
}

#[allow(clippy::too_many_arguments)]
fn acceptor_loop(
    mut listener: TcpListener,
    registry: Registry,
    pending: Arc<Mutex<VecDeque<Connection>>>,
    next_token: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    latch: Arc<CountdownLatch>,
    metrics: Arc<Metrics>,
) {
    let mut accept_poll = match Poll::new() {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "acceptor failed to create its poll instance");
            latch.count_down();
            return;
        }
    };
    if let Err(e) = accept_poll.registry().register(&mut listener, LISTENER_TOKEN, Interest::READABLE) {
        tracing::error!(error = %e, "acceptor failed to register the listener");
        latch.count_down();
        return;
    }

    let mut events = Events::with_capacity(128);
    while running.load(Ordering::Relaxed) {
        match accept_poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(error = %e, "acceptor poll failed");
                continue;
            }
        }

        for event in events.iter() {
            if event.token() != LISTENER_TOKEN {
                continue;
            }
            loop {
                match listener.accept() {
                    Ok((mut stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
                        }
                        let token = Token(next_token.fetch_add(1, Ordering::Relaxed));
                        if let Err(e) = registry.register(&mut stream, token, Interest::READABLE) {
                            tracing::warn!(error = %e, "failed to register accepted connection");
                            continue;
                        }
                        metrics.connection_opened();
                        tracing::debug!(?token, %addr, "accepted connection");
                        pending.lock().push_back(Connection::new(token, stream));
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        break;
                    }
                }
            }
        }
    }

    latch.count_down();
}

fn reactor_loop(
    mut poll: Poll,
    pending: Arc<Mutex<VecDeque<Connection>>>,
    mut dispatcher: Dispatcher,
    running: Arc<AtomicBool>,
    latch: Arc<CountdownLatch>,
) {
    let registry = match poll.registry().try_clone() {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "reactor failed to clone its registry");
            latch.count_down();
            return;
        }
    };
    let mut connections: HashMap<Token, Connection> = HashMap::new();
    let mut events = Events::with_capacity(1024);

    while running.load(Ordering::Relaxed) {
        drain_pending(&pending, &mut connections);

        match poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(error = %e, "reactor poll failed");
                continue;
            }
        }

        let mut to_close = Vec::new();
        for event in events.iter() {
            let token = event.token();
            let conn = match connections.get_mut(&token) {
                Some(c) => c,
                None => continue,
            };

            let mut close = false;
            if event.is_readable() && !drain_readable(conn, &mut dispatcher) {
                close = true;
            }
            if !close && (event.is_writable() || conn.has_pending_writes()) {
                match conn.flush() {
                    Ok(true) => {
                        if conn.writable_registered {
                            let _ = registry.reregister(&mut conn.stream, token, Interest::READABLE);
                            conn.writable_registered = false;
                        }
                    }
                    Ok(false) => {
                        if !conn.writable_registered {
                            let _ =
                                registry.reregister(&mut conn.stream, token, Interest::READABLE | Interest::WRITABLE);
                            conn.writable_registered = true;
                        }
                    }
                    Err(_) => close = true,
                }
            }
            if close {
                to_close.push(token);
            }
        }

        for token in to_close {
            if let Some(mut conn) = connections.remove(&token) {
                let _ = registry.deregister(&mut conn.stream);
                dispatcher.metrics().connection_closed();
            }
        }
    }

    for (_, mut conn) in connections.drain() {
        let _ = registry.deregister(&mut conn.stream);
    }
    latch.count_down();
}

fn drain_pending(pending: &Mutex<VecDeque<Connection>>, connections: &mut HashMap<Token, Connection>) {
    let mut queue = pending.lock();
    while let Some(conn) = queue.pop_front() {
        connections.insert(conn.token, conn);
    }
}

/// Reads whatever is available on one connection, dispatches every
/// complete frame it yields, and flushes the responses. Returns `false`
/// when the connection should be closed (peer hangup, I/O error, oversize
/// request, or a RESP framing error).
fn drain_readable(conn: &mut Connection, dispatcher: &mut Dispatcher) -> bool {
    conn.touch();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut attempts = 0u32;
    loop {
        if attempts >= READ_MAX_ATTEMPTS {
            break;
        }
        attempts += 1;
        match conn.stream.read(&mut buf) {
            Ok(0) => return false,
            Ok(n) => {
                if conn.append(&buf[..n]).is_err() {
                    tracing::warn!(token = ?conn.token, "closing connection: request exceeded MAX_REQUEST_SIZE");
                    return false;
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return false,
        }
    }

    loop {
        match next_frame(conn.unparsed()) {
            FrameKind::Incomplete => break,
            FrameKind::SkipSeparator => conn.advance(1),
            FrameKind::Custom(len) => {
                let response = dispatcher.handle_custom(&conn.unparsed()[..len - 1]);
                conn.queue_response(&response);
                conn.advance(len);
            }
            FrameKind::Resp(len) => {
                let frame = conn.unparsed()[..len].to_vec();
                let response = dispatcher.handle_resp(&frame, &mut conn.transaction);
                conn.queue_response(&response);
                conn.advance(len);
            }
            FrameKind::Error => {
                let response = resp::make_legacy_error(b"ERROR: Unable to parse request");
                conn.queue_response(&response);
                let _ = conn.flush();
                return false;
            }
        }
    }

    conn.flush().is_ok()
}
