//! Wire-protocol front end: accepts `OP_MSG` connections, runs commands
//! against a [`mantle_store::Storage`] backend, or forwards them to a
//! reference server in proxy and diff modes.

pub mod config;
pub mod conn;
pub mod debug;
pub mod dispatch;
pub mod handlers;
pub mod listener;
pub mod metrics;
pub mod shutdown;
pub mod tls;
pub mod upstream;

use std::sync::Arc;

use mantle_store::Storage;

pub use config::{Args, Config, ConfigError, Mode};
pub use dispatch::{CommandError, CommandTable, Dispatcher, ErrorCode, Request};
pub use listener::{Listener, ListenerError, ListenerOptions};
pub use metrics::Metrics;
pub use shutdown::Shutdown;

/// A dispatcher over the standard command set with fresh metrics.
pub fn standard_dispatcher(storage: Arc<dyn Storage>) -> Arc<Dispatcher> {
    let table = handlers::standard_table();
    let metrics = Arc::new(Metrics::new(table.names().collect::<Vec<_>>()));
    Arc::new(Dispatcher::new(Arc::new(table), storage, metrics))
}
