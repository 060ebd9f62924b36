mod permits;
mod store;

pub use store::{DEFAULT_MAX_CONNS, MemoryStore};
