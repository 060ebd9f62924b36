use std::io;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::pem::{self, PemObject};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ServerConfig, ServerConnection, StreamOwned};
use thiserror::Error;

/// Upper bound on a handshake, so a silent client cannot pin a thread.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub type TlsStream = StreamOwned<ServerConnection, TcpStream>;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("reading {path}: {source}")]
    Pem {
        path: PathBuf,
        #[source]
        source: pem::Error,
    },
    #[error("no certificates in {0}")]
    NoCertificates(PathBuf),
    #[error("tls: {0}")]
    Rustls(#[from] rustls::Error),
    #[error("handshake: {0}")]
    Handshake(#[from] io::Error),
}

/// Builds a server configuration from a PEM certificate chain and key.
pub fn load_server_config(cert: &Path, key: &Path) -> Result<Arc<ServerConfig>, TlsError> {
    let certs = CertificateDer::pem_file_iter(cert)
        .map_err(|e| pem_error(cert, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| pem_error(cert, e))?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert.to_path_buf()));
    }
    let key = PrivateKeyDer::from_pem_file(key).map_err(|e| pem_error(key, e))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(Arc::new(config))
}

fn pem_error(path: &Path, source: pem::Error) -> TlsError {
    TlsError::Pem {
        path: path.to_path_buf(),
        source,
    }
}

/// Runs the server side of the handshake to completion on `tcp`.
pub fn accept(config: Arc<ServerConfig>, mut tcp: TcpStream) -> Result<TlsStream, TlsError> {
    let previous = tcp.read_timeout()?;
    tcp.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;

    let mut conn = ServerConnection::new(config)?;
    while conn.is_handshaking() {
        let (read, written) = conn.complete_io(&mut tcp)?;
        if read == 0 && written == 0 && conn.is_handshaking() {
            return Err(TlsError::Handshake(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed during handshake",
            )));
        }
    }

    tcp.set_read_timeout(previous)?;
    Ok(StreamOwned::new(conn, tcp))
}
