use std::collections::HashMap;
use std::io;
use std::net::{Shutdown as SocketShutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rustls::ServerConfig;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Mode;
use crate::conn::{ConnContext, Connection, UpstreamHook};
use crate::dispatch::Dispatcher;
use crate::metrics::{CloseReason, Metrics};
use crate::shutdown::Shutdown;
use crate::tls;
use crate::upstream::Connector;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::listener");

/// How often the accept loop looks at the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// How long to wait for connection threads after their sockets were
/// force-closed.
const FORCE_CLOSE_WAIT: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("binding {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("listener i/o: {0}")]
    Io(#[from] io::Error),
}

pub struct ListenerOptions {
    pub mode: Mode,
    /// Required in proxy and diff modes.
    pub connector: Option<Arc<dyn Connector>>,
    pub tls: Option<Arc<ServerConfig>>,
    pub shutdown_grace: Duration,
    pub conn_timeout: Option<Duration>,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Direct,
            connector: None,
            tls: None,
            shutdown_grace: Duration::from_secs(5),
            conn_timeout: None,
        }
    }
}

/// Open connections by id, holding a clone of each socket so shutdown can
/// interrupt blocked reads.
type Registry = Arc<Mutex<HashMap<u64, Entry>>>;

struct Entry {
    client: TcpStream,
    /// The upstream leg in proxy and diff modes, once connected.
    upstream: Option<TcpStream>,
    forced: bool,
}

impl Entry {
    fn new(client: TcpStream) -> Self {
        Self {
            client,
            upstream: None,
            forced: false,
        }
    }

    fn set_upstream(&mut self, upstream: Option<TcpStream>) {
        if self.forced {
            // Connected after the force close went by.
            if let Some(stream) = &upstream {
                let _ = stream.shutdown(SocketShutdown::Both);
            }
        }
        self.upstream = upstream;
    }

    fn force_close(&mut self) {
        self.forced = true;
        let _ = self.client.shutdown(SocketShutdown::Both);
        if let Some(upstream) = &self.upstream {
            let _ = upstream.shutdown(SocketShutdown::Both);
        }
    }
}

pub struct Listener {
    tcp: TcpListener,
    dispatcher: Arc<Dispatcher>,
    options: ListenerOptions,
}

impl Listener {
    pub fn bind(
        addr: impl ToSocketAddrs + std::fmt::Display,
        dispatcher: Arc<Dispatcher>,
        options: ListenerOptions,
    ) -> Result<Self, ListenerError> {
        let tcp = TcpListener::bind(&addr).map_err(|source| ListenerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self {
            tcp,
            dispatcher,
            options,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    fn metrics(&self) -> &Metrics {
        self.dispatcher.metrics()
    }

    /// Accepts connections until `shutdown` is triggered, then waits up to
    /// the grace period for open connections before closing the rest.
    pub fn run(&self, shutdown: &Shutdown) -> Result<(), ListenerError> {
        // Poll-based accept so the shutdown flag is noticed promptly.
        self.tcp.set_nonblocking(true)?;
        info!(
            target: LISTENER_TARGET,
            addr = %self.local_addr()?,
            mode = %self.options.mode,
            tls = self.options.tls.is_some(),
            "listening"
        );

        let ctx = Arc::new(ConnContext::new(
            self.options.mode,
            Arc::clone(&self.dispatcher),
            self.options.connector.clone(),
            shutdown.clone(),
        ));
        let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<u64>();
        let mut handles: HashMap<u64, JoinHandle<()>> = HashMap::new();
        let mut next_id = 0u64;

        while !shutdown.is_triggered() {
            match self.tcp.accept() {
                Ok((stream, peer)) => {
                    next_id += 1;
                    match self.spawn(next_id, stream, peer, &ctx, &registry, done_tx.clone()) {
                        Ok(handle) => {
                            handles.insert(next_id, handle);
                        }
                        Err(e) => warn!(target: LISTENER_TARGET, %peer, error = %e, "could not start connection"),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    reap(&done_rx, &mut handles);
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    warn!(target: LISTENER_TARGET, error = %e, "accept failed");
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }

        info!(target: LISTENER_TARGET, open = registry.lock().len(), "shutting down, draining connections");
        drop(done_tx);

        // Unblock every connection waiting in a read.
        for entry in registry.lock().values() {
            let _ = entry.client.shutdown(SocketShutdown::Read);
        }

        drain(&done_rx, &mut handles, self.options.shutdown_grace);

        if !handles.is_empty() {
            let mut stuck = registry.lock();
            warn!(
                target: LISTENER_TARGET,
                count = stuck.len(),
                "grace period expired, force-closing connections"
            );
            for entry in stuck.values_mut() {
                entry.force_close();
            }
            self.metrics().connections().force_closed(stuck.len() as u64);
            drop(stuck);

            drain(&done_rx, &mut handles, FORCE_CLOSE_WAIT);
            if !handles.is_empty() {
                warn!(target: LISTENER_TARGET, count = handles.len(), "connections still running after force close");
            }
        }

        info!(target: LISTENER_TARGET, "listener stopped");
        Ok(())
    }

    fn spawn(
        &self,
        id: u64,
        stream: TcpStream,
        peer: SocketAddr,
        ctx: &Arc<ConnContext>,
        registry: &Registry,
        done: Sender<u64>,
    ) -> io::Result<JoinHandle<()>> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.options.conn_timeout)?;
        registry.lock().insert(id, Entry::new(stream.try_clone()?));

        let ctx = Arc::clone(ctx);
        let conns = Arc::clone(registry);
        let upstreams = Arc::clone(registry);
        let hook: UpstreamHook = Box::new(move |upstream| {
            if let Some(entry) = upstreams.lock().get_mut(&id) {
                entry.set_upstream(upstream);
            }
        });
        let tls = self.options.tls.clone();
        let metrics = Arc::clone(self.dispatcher.metrics());
        metrics.connections().opened();
        debug!(target: LISTENER_TARGET, %peer, id, "accepted");

        let spawned = thread::Builder::new()
            .name(format!("conn-{id}"))
            .spawn(move || {
                let reason = serve(stream, peer, ctx, tls, hook, &metrics);
                metrics.connections().closed(reason);
                conns.lock().remove(&id);
                debug!(target: LISTENER_TARGET, %peer, id, ?reason, "closed");
                let _ = done.send(id);
            });
        spawned.inspect_err(|_| {
            // The thread never ran, so undo its bookkeeping here.
            registry.lock().remove(&id);
            self.metrics().connections().closed(CloseReason::Error);
        })
    }
}

fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ConnContext>,
    tls: Option<Arc<ServerConfig>>,
    hook: UpstreamHook,
    metrics: &Metrics,
) -> CloseReason {
    match tls {
        None => Connection::new(stream, peer, ctx).with_upstream_hook(hook).run(),
        Some(config) => match tls::accept(config, stream) {
            Ok(stream) => Connection::new(stream, peer, ctx).with_upstream_hook(hook).run(),
            Err(e) if ctx.shutdown.is_triggered() => {
                debug!(target: LISTENER_TARGET, %peer, error = %e, "tls handshake interrupted by shutdown");
                CloseReason::Shutdown
            }
            Err(e) => {
                metrics.connections().tls_failed();
                warn!(target: LISTENER_TARGET, %peer, error = %e, "tls handshake failed");
                CloseReason::Error
            }
        },
    }
}

/// Joins connection threads as they finish, for at most `wait`.
fn drain(done: &Receiver<u64>, handles: &mut HashMap<u64, JoinHandle<()>>, wait: Duration) {
    let deadline = Instant::now() + wait;
    while !handles.is_empty() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match done.recv_timeout(remaining) {
            Ok(id) => join(handles, id),
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => {
                reap(done, handles);
                break;
            }
        }
    }
}

/// Joins connection threads that have already reported completion.
fn reap(done: &Receiver<u64>, handles: &mut HashMap<u64, JoinHandle<()>>) {
    for id in done.try_iter() {
        join(handles, id);
    }
}

fn join(handles: &mut HashMap<u64, JoinHandle<()>>, id: u64) {
    if let Some(handle) = handles.remove(&id) {
        let _ = handle.join();
    }
}
