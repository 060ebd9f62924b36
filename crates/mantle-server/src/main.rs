use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mantle_server::upstream::{Connector, TcpConnector};
use mantle_server::{Args, Listener, ListenerOptions, Mode, Shutdown, debug, standard_dispatcher, tls};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;

    // RUST_LOG wins over --log-level when set.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let storage = config.open_storage()?;
    let dispatcher = standard_dispatcher(storage);
    let metrics = Arc::clone(dispatcher.metrics());

    let tls = match &config.tls {
        Some(files) => Some(tls::load_server_config(&files.cert, &files.key).context("loading TLS files")?),
        None => None,
    };
    let connector: Option<Arc<dyn Connector>> = match config.mode {
        Mode::Direct => None,
        Mode::Proxy | Mode::Diff => Some(Arc::new(TcpConnector::new(config.proxy_addr.as_str()))),
    };

    let listener = Listener::bind(
        config.listen_addr.as_str(),
        dispatcher,
        ListenerOptions {
            mode: config.mode,
            connector,
            tls,
            shutdown_grace: config.shutdown_grace,
            conn_timeout: config.conn_timeout,
        },
    )?;

    let debug_server = match &config.debug_addr {
        Some(addr) => Some(
            debug::DebugServer::spawn(addr, Arc::clone(&metrics))
                .with_context(|| format!("starting debug endpoint on {addr}"))?,
        ),
        None => None,
    };

    let shutdown = Shutdown::new();
    shutdown.register_signals().context("installing signal handlers")?;

    info!(version = env!("CARGO_PKG_VERSION"), mode = %config.mode, "mantle-server starting");
    listener.run(&shutdown)?;

    if let Some(server) = debug_server {
        server.stop();
    }
    let snapshot = metrics.snapshot();
    info!(
        metrics = %serde_json::to_string(&snapshot).unwrap_or_default(),
        "final metrics"
    );
    Ok(())
}
