//! Command lookup and invocation.
//!
//! A request document names its command by its first key. The
//! [`Dispatcher`] looks that name up in an immutable [`CommandTable`],
//! runs the handler and always produces a reply document: handler errors
//! and panics become error replies instead of tearing down the connection.

mod error;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use mantle_document::{Document, Value};
use mantle_store::Storage;
use tracing::{debug, error};

use crate::metrics::{Metrics, Outcome};

pub use error::{CommandError, ErrorCode};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

pub type Handler = fn(&Request<'_>) -> Result<Document, CommandError>;

#[derive(Clone, Copy)]
pub struct Command {
    pub name: &'static str,
    pub help: &'static str,
    pub handler: Handler,
}

/// Name → handler table. Built once and never mutated afterwards.
pub struct CommandTable {
    commands: BTreeMap<&'static str, Command>,
}

impl CommandTable {
    pub fn builder() -> CommandTableBuilder {
        CommandTableBuilder {
            commands: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    /// Commands sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

pub struct CommandTableBuilder {
    commands: BTreeMap<&'static str, Command>,
}

impl CommandTableBuilder {
    /// Registers `handler` under `name`. A later registration of the same
    /// name replaces the earlier one.
    pub fn command(mut self, name: &'static str, help: &'static str, handler: Handler) -> Self {
        self.commands.insert(name, Command { name, help, handler });
        self
    }

    pub fn build(self) -> CommandTable {
        CommandTable {
            commands: self.commands,
        }
    }
}

/// Everything a handler may look at while serving one command.
pub struct Request<'a> {
    pub document: &'a Document,
    pub peer: Option<SocketAddr>,
    dispatcher: &'a Dispatcher,
}

impl<'a> Request<'a> {
    pub fn storage(&self) -> &dyn Storage {
        self.dispatcher.storage.as_ref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.dispatcher.metrics
    }

    pub fn table(&self) -> &CommandTable {
        &self.dispatcher.table
    }

    pub fn started(&self) -> Instant {
        self.dispatcher.started
    }

    /// Name of the command, i.e. the first key of the request.
    pub fn command_name(&self) -> &'a str {
        self.document.first_key().unwrap_or_default()
    }

    /// The value stored under the command name.
    pub fn command_value(&self) -> Option<&'a Value> {
        self.document.get(self.command_name())
    }

    /// Target database from `$db`.
    pub fn db(&self) -> Result<&'a str, CommandError> {
        match self.document.get("$db") {
            Some(Value::String(db)) if !db.is_empty() => Ok(db.as_str()),
            Some(Value::String(_)) => Err(CommandError::new(ErrorCode::BadValue, "$db must not be empty")),
            Some(other) => Err(CommandError::new(
                ErrorCode::TypeMismatch,
                format!("$db must be a string, not {}", other.kind().name()),
            )),
            None => Err(CommandError::new(
                ErrorCode::FailedToParse,
                "required parameter \"$db\" is missing",
            )),
        }
    }
}

pub struct Dispatcher {
    table: Arc<CommandTable>,
    storage: Arc<dyn Storage>,
    metrics: Arc<Metrics>,
    started: Instant,
}

impl Dispatcher {
    pub fn new(table: Arc<CommandTable>, storage: Arc<dyn Storage>, metrics: Arc<Metrics>) -> Self {
        Self {
            table,
            storage,
            metrics,
            started: Instant::now(),
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Runs the command named by `document` and returns the reply. Never
    /// fails: every error is folded into an error reply.
    pub fn dispatch(&self, document: &Document, peer: Option<SocketAddr>) -> Document {
        let name = document.first_key().unwrap_or_default();
        let counters = self.metrics.command(name);
        let start = Instant::now();

        let Some(command) = self.table.get(name) else {
            debug!(target: DISPATCH_TARGET, command = name, "unknown command");
            counters.record(start.elapsed(), Outcome::Failed);
            return CommandError::new(ErrorCode::CommandNotFound, format!("no such command: '{name}'"))
                .to_document();
        };

        let request = Request {
            document,
            peer,
            dispatcher: self,
        };
        let result = catch_unwind(AssertUnwindSafe(|| (command.handler)(&request)));

        match result {
            Ok(Ok(mut reply)) => {
                if !reply.contains_key("ok") {
                    reply.set("ok", 1.0);
                }
                counters.record(start.elapsed(), Outcome::Ok);
                reply
            }
            Ok(Err(err)) => {
                debug!(target: DISPATCH_TARGET, command = name, error = %err, "command failed");
                counters.record(start.elapsed(), Outcome::Failed);
                err.to_document()
            }
            Err(payload) => {
                let detail = panic_message(payload.as_ref());
                error!(
                    target: DISPATCH_TARGET,
                    command = name,
                    request = ?document,
                    panic = detail,
                    "handler panicked"
                );
                counters.record(start.elapsed(), Outcome::Panicked);
                CommandError::internal(format!("internal error while running {name}")).to_document()
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mantle_document::doc;
    use mantle_store::MemoryStore;

    fn pong(_: &Request<'_>) -> Result<Document, CommandError> {
        Ok(doc! { "pong" => true })
    }

    fn refuse(_: &Request<'_>) -> Result<Document, CommandError> {
        Err(CommandError::new(ErrorCode::NotImplemented, "not today"))
    }

    fn explode(_: &Request<'_>) -> Result<Document, CommandError> {
        panic!("boom")
    }

    fn echo_db(req: &Request<'_>) -> Result<Document, CommandError> {
        Ok(doc! { "db" => req.db()?, "ok" => 2.0 })
    }

    fn dispatcher() -> Dispatcher {
        let table = CommandTable::builder()
            .command("pong", "", pong)
            .command("refuse", "", refuse)
            .command("explode", "", explode)
            .command("echoDb", "", echo_db)
            .build();
        let metrics = Arc::new(Metrics::new(table.names().collect::<Vec<_>>()));
        Dispatcher::new(Arc::new(table), Arc::new(MemoryStore::new()), metrics)
    }

    #[test]
    fn success_gets_ok_appended() {
        let reply = dispatcher().dispatch(&doc! { "pong" => 1 }, None);
        assert_eq!(reply, doc! { "pong" => true, "ok" => 1.0 });
        assert_eq!(reply.keys().last(), Some("ok"));
    }

    #[test]
    fn handler_supplied_ok_is_kept() {
        let reply = dispatcher().dispatch(&doc! { "echoDb" => 1, "$db" => "monila" }, None);
        assert_eq!(reply, doc! { "db" => "monila", "ok" => 2.0 });
    }

    #[test]
    fn unknown_command_is_command_not_found() {
        let d = dispatcher();
        let reply = d.dispatch(&doc! { "frobnicate" => 1 }, None);
        assert_eq!(reply.get("code"), Some(&Value::Int32(59)));
        assert_eq!(reply.get_str("errmsg"), Some("no such command: 'frobnicate'"));
        assert_eq!(d.metrics().snapshot().unknown_commands.failures, 1);
    }

    #[test]
    fn handler_errors_become_error_replies() {
        let reply = dispatcher().dispatch(&doc! { "refuse" => 1 }, None);
        assert_eq!(reply.get("ok"), Some(&Value::Double(0.0)));
        assert_eq!(reply.get_str("codeName"), Some("NotImplemented"));
    }

    #[test]
    fn panics_are_contained() {
        let d = dispatcher();
        let reply = d.dispatch(&doc! { "explode" => 1 }, None);
        assert_eq!(reply.get_str("codeName"), Some("InternalError"));

        let after = d.dispatch(&doc! { "pong" => 1 }, None);
        assert_eq!(after.get("ok"), Some(&Value::Double(1.0)));

        let snap = d.metrics().snapshot();
        assert_eq!(snap.commands["explode"].panics, 1);
        assert_eq!(snap.commands["pong"].calls, 1);
    }

    #[test]
    fn missing_db_is_reported() {
        let reply = dispatcher().dispatch(&doc! { "echoDb" => 1 }, None);
        assert_eq!(reply.get_str("codeName"), Some("FailedToParse"));
    }

    #[test]
    fn empty_document_is_unknown_command() {
        let reply = dispatcher().dispatch(&Document::new(), None);
        assert_eq!(reply.get("code"), Some(&Value::Int32(59)));
    }
}
