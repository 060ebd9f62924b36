//! Debug HTTP endpoint, served by axum on its own tokio runtime thread.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::metrics::{Metrics, MetricsSnapshot};

const DEBUG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::debug");

pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/debug/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> Json<MetricsSnapshot> {
    Json(metrics.snapshot())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// A running debug endpoint. Dropping it leaves the thread running; call
/// [`DebugServer::stop`] to shut it down.
pub struct DebugServer {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    thread: JoinHandle<()>,
}

impl DebugServer {
    /// Binds `addr` and serves on a background thread.
    pub fn spawn(addr: &str, metrics: Arc<Metrics>) -> io::Result<Self> {
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local = listener.local_addr()?;
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let (stop, stopped) = oneshot::channel::<()>();

        let thread = thread::Builder::new().name("debug-http".into()).spawn(move || {
            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(l) => l,
                    Err(e) => {
                        warn!(target: DEBUG_TARGET, error = %e, "debug endpoint unavailable");
                        return;
                    }
                };
                info!(target: DEBUG_TARGET, addr = %local, "debug endpoint listening");
                let shutdown = async {
                    let _ = stopped.await;
                };
                if let Err(e) = axum::serve(listener, router(metrics))
                    .with_graceful_shutdown(shutdown)
                    .await
                {
                    warn!(target: DEBUG_TARGET, error = %e, "debug endpoint failed");
                }
            });
        })?;

        Ok(Self {
            addr: local,
            stop,
            thread,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.thread.join();
    }
}
