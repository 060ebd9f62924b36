//! Forwarding to a reference server for proxy and diff modes.

use std::io::{self, BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use mantle_wire::{Frame, WireError, read_frame, write_frame};

/// A connection to the reference server that moves whole frames.
pub trait Upstream: Send {
    /// Sends `request` verbatim. Returns the reply, or `None` when the
    /// request does not expect one.
    fn round_trip(&mut self, request: &Frame) -> Result<Option<Frame>, WireError>;

    /// A second handle on the underlying socket, used to shut the
    /// connection down from another thread while a round trip is blocked.
    fn socket(&self) -> Option<TcpStream> {
        None
    }
}

/// Opens upstream connections; one per client connection.
pub trait Connector: Send + Sync {
    fn connect(&self) -> io::Result<Box<dyn Upstream>>;
}

pub struct TcpUpstream {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl TcpUpstream {
    pub fn connect(addr: impl ToSocketAddrs, timeout: Option<Duration>) -> io::Result<Self> {
        let stream = match timeout {
            Some(timeout) => {
                let addr = addr
                    .to_socket_addrs()?
                    .next()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no address to connect to"))?;
                TcpStream::connect_timeout(&addr, timeout)?
            }
            None => TcpStream::connect(addr)?,
        };
        stream.set_nodelay(true)?;
        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        })
    }
}

impl Upstream for TcpUpstream {
    fn round_trip(&mut self, request: &Frame) -> Result<Option<Frame>, WireError> {
        write_frame(&mut self.writer, request)?;
        if !request.expects_reply() {
            return Ok(None);
        }
        read_frame(&mut self.reader).map(Some)
    }

    fn socket(&self) -> Option<TcpStream> {
        self.writer.get_ref().try_clone().ok()
    }
}

/// Connects to a fixed address over plain TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: Some(Duration::from_secs(5)),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> io::Result<Box<dyn Upstream>> {
        Ok(Box::new(TcpUpstream::connect(self.addr.as_str(), self.timeout)?))
    }
}
