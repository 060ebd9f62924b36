use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mantle_document::{Document, doc};
use serde::Serialize;

/// Counters for a single command name.
#[derive(Default)]
pub struct CommandCounters {
    calls: AtomicU64,
    failures: AtomicU64,
    panics: AtomicU64,
    latency_micros: AtomicU64,
}

impl CommandCounters {
    pub fn record(&self, elapsed: Duration, outcome: Outcome) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.latency_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        match outcome {
            Outcome::Ok => {}
            Outcome::Failed => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Panicked => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                self.panics.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> CommandSnapshot {
        CommandSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
            latency_micros: self.latency_micros.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Failed,
    Panicked,
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Peer,
    Shutdown,
    Error,
}

#[derive(Default)]
pub struct ConnectionMetrics {
    accepted: AtomicU64,
    active: AtomicU64,
    closed_by_peer: AtomicU64,
    closed_by_shutdown: AtomicU64,
    closed_by_error: AtomicU64,
    tls_failures: AtomicU64,
    force_closed: AtomicU64,
}

impl ConnectionMetrics {
    pub fn opened(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn closed(&self, reason: CloseReason) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        let counter = match reason {
            CloseReason::Peer => &self.closed_by_peer,
            CloseReason::Shutdown => &self.closed_by_shutdown,
            CloseReason::Error => &self.closed_by_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tls_failed(&self) {
        self.tls_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn force_closed(&self, n: u64) {
        self.force_closed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            closed_by_peer: self.closed_by_peer.load(Ordering::Relaxed),
            closed_by_shutdown: self.closed_by_shutdown.load(Ordering::Relaxed),
            closed_by_error: self.closed_by_error.load(Ordering::Relaxed),
            tls_failures: self.tls_failures.load(Ordering::Relaxed),
            force_closed: self.force_closed.load(Ordering::Relaxed),
        }
    }
}

/// Process-wide counters. The set of command names is fixed at construction,
/// so lookups need no locking.
pub struct Metrics {
    commands: BTreeMap<&'static str, CommandCounters>,
    unknown: CommandCounters,
    connections: ConnectionMetrics,
}

impl Metrics {
    pub fn new(names: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            commands: names
                .into_iter()
                .map(|name| (name, CommandCounters::default()))
                .collect(),
            unknown: CommandCounters::default(),
            connections: ConnectionMetrics::default(),
        }
    }

    /// Counters for `name`, or the shared bucket for unknown commands.
    pub fn command(&self, name: &str) -> &CommandCounters {
        self.commands.get(name).unwrap_or(&self.unknown)
    }

    pub fn connections(&self) -> &ConnectionMetrics {
        &self.connections
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commands: self
                .commands
                .iter()
                .map(|(name, c)| (name.to_string(), c.snapshot()))
                .collect(),
            unknown_commands: self.unknown.snapshot(),
            connections: self.connections.snapshot(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandSnapshot {
    pub calls: u64,
    pub failures: u64,
    pub panics: u64,
    pub latency_micros: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub accepted: u64,
    pub active: u64,
    pub closed_by_peer: u64,
    pub closed_by_shutdown: u64,
    pub closed_by_error: u64,
    pub tls_failures: u64,
    pub force_closed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub commands: BTreeMap<String, CommandSnapshot>,
    pub unknown_commands: CommandSnapshot,
    pub connections: ConnectionSnapshot,
}

impl MetricsSnapshot {
    /// The `metrics` section of `serverStatus`.
    pub fn to_document(&self) -> Document {
        let mut commands = Document::new();
        for (name, c) in &self.commands {
            commands.set(name.as_str(), c.to_document());
        }
        commands.set("<UNKNOWN>", self.unknown_commands.to_document());

        let c = &self.connections;
        doc! {
            "commands" => commands,
            "connections" => doc! {
                "accepted" => c.accepted as i64,
                "active" => c.active as i64,
                "closedByPeer" => c.closed_by_peer as i64,
                "closedByShutdown" => c.closed_by_shutdown as i64,
                "closedByError" => c.closed_by_error as i64,
                "tlsFailures" => c.tls_failures as i64,
                "forceClosed" => c.force_closed as i64,
            },
        }
    }
}

impl CommandSnapshot {
    fn to_document(self) -> Document {
        doc! {
            "total" => self.calls as i64,
            "failed" => self.failures as i64,
            "panics" => self.panics as i64,
            "latencyMicros" => self.latency_micros as i64,
        }
    }
}
