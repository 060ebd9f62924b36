#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mantle_client::Client;
use mantle_document::{Document, doc};
use mantle_server::{Dispatcher, Listener, ListenerError, ListenerOptions, Shutdown, standard_dispatcher};
use mantle_store::MemoryStore;

pub const DB: &str = "monila";

pub struct TestServer {
    pub addr: SocketAddr,
    pub dispatcher: Arc<Dispatcher>,
    shutdown: Shutdown,
    handle: JoinHandle<Result<(), ListenerError>>,
}

impl TestServer {
    pub fn start(options: ListenerOptions) -> Self {
        Self::start_with(standard_dispatcher(Arc::new(MemoryStore::new())), options)
    }

    pub fn direct() -> Self {
        Self::start(ListenerOptions::default())
    }

    pub fn start_with(dispatcher: Arc<Dispatcher>, options: ListenerOptions) -> Self {
        let listener = Listener::bind("127.0.0.1:0", Arc::clone(&dispatcher), options).unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let signal = shutdown.clone();
        let handle = thread::spawn(move || listener.run(&signal));
        Self {
            addr,
            dispatcher,
            shutdown,
            handle,
        }
    }

    pub fn client(&self) -> Client {
        let client = Client::connect(self.addr).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        client
    }

    /// Triggers shutdown and waits for `run` to return. Returns how long
    /// that took.
    pub fn stop(self) -> Duration {
        let started = Instant::now();
        self.shutdown.trigger();
        self.handle.join().unwrap().unwrap();
        started.elapsed()
    }
}

pub fn actors() -> Vec<Document> {
    [
        (1, "PENELOPE", "GUINESS"),
        (2, "NICK", "WAHLBERG"),
        (10, "CHRISTIAN", "GABLE"),
        (28, "WOODY", "HOFFMAN"),
        (79, "MAE", "HOFFMAN"),
        (100, "JOE", "SWANK"),
        (169, "KENNETH", "HOFFMAN"),
    ]
    .into_iter()
    .map(|(id, first, last)| doc! { "actor_id" => id, "first_name" => first, "last_name" => last })
    .collect()
}

pub fn seed(client: &mut Client) {
    client.create_collection(DB, "actor").unwrap();
    assert_eq!(client.insert(DB, "actor", actors()).unwrap(), 7);
}

/// Polls `cond` until it holds or `timeout` passes.
pub fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}
