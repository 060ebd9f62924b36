//! Storage behind the document front end: databases of collections whose
//! rows hold encoded documents.

mod error;
mod memory;
mod open;
mod storage;

pub use error::StoreError;
pub use memory::{DEFAULT_MAX_CONNS, MemoryStore};
pub use open::open;
pub use storage::{CollectionInfo, DatabaseInfo, Storage, namespace};
