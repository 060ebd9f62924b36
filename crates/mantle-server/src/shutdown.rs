use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

/// Process-wide cancellation flag shared by the listener and its
/// connections. Cloning yields another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag when the process receives SIGTERM or SIGINT.
    pub fn register_signals(&self) -> io::Result<()> {
        flag::register(SIGTERM, Arc::clone(&self.flag))?;
        flag::register(SIGINT, Arc::clone(&self.flag))?;
        Ok(())
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
