//! Per-connection message loop.
//!
//! ```text
//! Reading ──► Dispatching ──► Writing ──► Reading
//!    │             │             │
//!    └─────────────┴─────────────┴──► Closed
//! ```
//!
//! One request is in flight at a time: the reply to a request is written
//! before the next request is read.

use std::io::{self, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use mantle_document::Document;
use mantle_wire::{Frame, MsgHeader, OpCode, OpMsg, WireError, parse_message, write_message};
use tracing::{debug, trace, warn};

use crate::config::Mode;
use crate::dispatch::{CommandError, Dispatcher, ErrorCode};
use crate::metrics::CloseReason;
use crate::shutdown::Shutdown;
use crate::upstream::{Connector, Upstream};

const CONN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::conn");

/// State shared by every connection of one listener.
pub struct ConnContext {
    pub mode: Mode,
    pub dispatcher: Arc<Dispatcher>,
    pub connector: Option<Arc<dyn Connector>>,
    pub shutdown: Shutdown,
    request_ids: AtomicI32,
}

impl ConnContext {
    pub fn new(
        mode: Mode,
        dispatcher: Arc<Dispatcher>,
        connector: Option<Arc<dyn Connector>>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            mode,
            dispatcher,
            connector,
            shutdown,
            request_ids: AtomicI32::new(1),
        }
    }

    /// Ids for reply headers, increasing across all connections.
    fn next_request_id(&self) -> i32 {
        self.request_ids.fetch_add(1, Ordering::Relaxed)
    }
}

/// Told about every upstream socket a connection opens (`Some`) and drops
/// (`None`), so the listener can close it at shutdown.
pub type UpstreamHook = Box<dyn Fn(Option<TcpStream>) + Send>;

enum State {
    Reading,
    Dispatching(Frame),
    Writing(Vec<u8>),
    Closed(CloseReason),
}

pub struct Connection<S: Read + Write> {
    stream: BufReader<S>,
    peer: SocketAddr,
    ctx: Arc<ConnContext>,
    upstream: Option<Box<dyn Upstream>>,
    on_upstream: Option<UpstreamHook>,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S, peer: SocketAddr, ctx: Arc<ConnContext>) -> Self {
        Self {
            stream: BufReader::new(stream),
            peer,
            ctx,
            upstream: None,
            on_upstream: None,
        }
    }

    pub fn with_upstream_hook(mut self, hook: UpstreamHook) -> Self {
        self.on_upstream = Some(hook);
        self
    }

    fn set_upstream(&mut self, upstream: Option<Box<dyn Upstream>>) {
        if let Some(hook) = &self.on_upstream {
            hook(upstream.as_ref().and_then(|u| u.socket()));
        }
        self.upstream = upstream;
    }

    /// Failures seen after shutdown was triggered are the listener closing
    /// sockets under us, not faults of the peer.
    fn close_reason(&self) -> CloseReason {
        if self.ctx.shutdown.is_triggered() {
            CloseReason::Shutdown
        } else {
            CloseReason::Error
        }
    }

    /// Serves requests until the peer leaves, an error occurs, or shutdown
    /// is observed.
    pub fn run(mut self) -> CloseReason {
        if self.ctx.mode != Mode::Direct {
            // Open the upstream leg right away; a failure is retried per
            // request and answered in-band.
            self.upstream();
        }

        let mut state = State::Reading;
        loop {
            state = match state {
                State::Reading => self.read(),
                State::Dispatching(frame) => self.dispatch(frame),
                State::Writing(bytes) => self.write(&bytes),
                State::Closed(reason) => return reason,
            };
        }
    }

    fn read(&mut self) -> State {
        if self.ctx.shutdown.is_triggered() {
            return State::Closed(CloseReason::Shutdown);
        }
        match mantle_wire::read_frame(&mut self.stream) {
            Ok(frame) => {
                trace!(
                    target: CONN_TARGET,
                    peer = %self.peer,
                    request_id = frame.header.request_id,
                    op_code = ?frame.header.op_code,
                    len = frame.body.len(),
                    "request"
                );
                State::Dispatching(frame)
            }
            Err(_) if self.ctx.shutdown.is_triggered() => State::Closed(CloseReason::Shutdown),
            Err(WireError::ConnectionClosed) => {
                debug!(target: CONN_TARGET, peer = %self.peer, "peer closed connection");
                State::Closed(CloseReason::Peer)
            }
            Err(WireError::Io(e)) if is_timeout(&e) => {
                debug!(target: CONN_TARGET, peer = %self.peer, "idle timeout");
                State::Closed(CloseReason::Error)
            }
            Err(e) => {
                warn!(target: CONN_TARGET, peer = %self.peer, error = %e, "closing connection");
                State::Closed(CloseReason::Error)
            }
        }
    }

    fn dispatch(&mut self, frame: Frame) -> State {
        let reply = match self.ctx.mode {
            Mode::Direct => self.serve_locally(&frame),
            Mode::Proxy => self.forward(&frame),
            Mode::Diff => self.diff(&frame),
        };
        match reply {
            Ok(Some(bytes)) => State::Writing(bytes),
            Ok(None) => State::Reading,
            Err(e) => {
                let reason = self.close_reason();
                if reason == CloseReason::Error {
                    warn!(target: CONN_TARGET, peer = %self.peer, error = %e, "closing connection");
                }
                State::Closed(reason)
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> State {
        let out = self.stream.get_mut();
        match out.write_all(bytes).and_then(|()| out.flush()) {
            Ok(()) => State::Reading,
            Err(e) => {
                let reason = self.close_reason();
                if reason == CloseReason::Error {
                    warn!(target: CONN_TARGET, peer = %self.peer, error = %e, "write failed");
                }
                State::Closed(reason)
            }
        }
    }

    /// Runs the command locally. Returns the encoded reply, or `None` when
    /// the client asked for no reply.
    fn serve_locally(&self, frame: &Frame) -> Result<Option<Vec<u8>>, WireError> {
        let msg = parse_message(frame)?;
        let command = msg.document()?;
        let reply = self.ctx.dispatcher.dispatch(&command, Some(self.peer));
        if msg.more_to_come() {
            return Ok(None);
        }
        self.encode_reply(&frame.header, reply).map(Some)
    }

    fn encode_reply(&self, request: &MsgHeader, reply: Document) -> Result<Vec<u8>, WireError> {
        let header = MsgHeader::reply_to(request, self.ctx.next_request_id());
        let mut out = Vec::new();
        write_message(&mut out, header, &OpMsg::new(reply))?;
        Ok(out)
    }

    fn upstream(&mut self) -> Option<&mut Box<dyn Upstream>> {
        if self.upstream.is_none() {
            let connector = self.ctx.connector.as_ref()?;
            match connector.connect() {
                Ok(upstream) => self.set_upstream(Some(upstream)),
                Err(e) => {
                    warn!(target: CONN_TARGET, peer = %self.peer, error = %e, "upstream unreachable");
                    return None;
                }
            }
        }
        self.upstream.as_mut()
    }

    /// Sends `frame` upstream. An upstream failure drops the upstream
    /// connection so the next request reconnects.
    fn round_trip(&mut self, frame: &Frame) -> Result<Option<Frame>, String> {
        let Some(upstream) = self.upstream() else {
            return Err("upstream unreachable".to_string());
        };
        match upstream.round_trip(frame) {
            Ok(reply) => Ok(reply),
            Err(e) => {
                if !self.ctx.shutdown.is_triggered() {
                    warn!(target: CONN_TARGET, peer = %self.peer, error = %e, "upstream request failed");
                }
                self.set_upstream(None);
                Err(e.to_string())
            }
        }
    }

    fn forward(&mut self, frame: &Frame) -> Result<Option<Vec<u8>>, WireError> {
        match self.round_trip(frame) {
            Ok(reply) => Ok(reply.map(|f| f.to_bytes())),
            Err(reason) => self.host_unreachable(frame, &reason),
        }
    }

    /// Answers an unreachable upstream in-band when the request is a
    /// command awaiting a reply; anything else has no way to carry the error.
    /// Once shutdown is triggered the connection is closed instead.
    fn host_unreachable(&self, frame: &Frame, reason: &str) -> Result<Option<Vec<u8>>, WireError> {
        if frame.header.op_code != OpCode::Msg || self.ctx.shutdown.is_triggered() {
            return Err(WireError::Io(io::Error::new(io::ErrorKind::NotConnected, reason.to_string())));
        }
        if !frame.expects_reply() {
            return Ok(None);
        }
        let err = CommandError::new(ErrorCode::HostUnreachable, format!("upstream: {reason}"));
        self.encode_reply(&frame.header, err.to_document()).map(Some)
    }

    fn diff(&mut self, frame: &Frame) -> Result<Option<Vec<u8>>, WireError> {
        if frame.header.op_code != OpCode::Msg {
            return self.forward(frame);
        }

        let msg = parse_message(frame)?;
        let command = msg.document()?;
        let local = self.ctx.dispatcher.dispatch(&command, Some(self.peer));

        let upstream = match self.round_trip(frame) {
            Ok(reply) => reply,
            Err(reason) => return self.host_unreachable(frame, &reason),
        };
        let Some(upstream) = upstream else {
            return Ok(None);
        };

        match parse_message(&upstream).and_then(|m| m.document()) {
            Ok(remote) if remote == local => {
                trace!(target: CONN_TARGET, peer = %self.peer, "replies match");
            }
            Ok(remote) => {
                warn!(
                    target: CONN_TARGET,
                    peer = %self.peer,
                    request = ?command,
                    local = ?local,
                    upstream = ?remote,
                    "replies differ"
                );
            }
            Err(e) => {
                warn!(
                    target: CONN_TARGET,
                    peer = %self.peer,
                    request = ?command,
                    error = %e,
                    "upstream reply unreadable"
                );
            }
        }
        Ok(Some(upstream.to_bytes()))
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
