use mantle_document::Document;

use crate::error::StoreError;

/// Summary of one database (schema).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub name: String,
    pub collections: usize,
    pub objects: usize,
    /// Total encoded size of all rows, in bytes.
    pub size: u64,
}

impl DatabaseInfo {
    pub fn is_empty(&self) -> bool {
        self.collections == 0
    }
}

/// Summary of one collection (table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub count: usize,
    pub size: u64,
}

impl CollectionInfo {
    pub fn avg_obj_size(&self) -> u64 {
        match self.count {
            0 => 0,
            n => self.size / n as u64,
        }
    }
}

/// Relational backend seen as databases of collections of documents.
///
/// Implementations are shared by every connection and must be safe for
/// concurrent use. When the backend's connections are exhausted, calls fail
/// with [`StoreError::Busy`] instead of waiting.
pub trait Storage: Send + Sync {
    /// All databases, sorted by name.
    fn list_databases(&self) -> Result<Vec<DatabaseInfo>, StoreError>;

    fn database_stats(&self, db: &str) -> Result<DatabaseInfo, StoreError>;

    /// Drops `db` and everything in it. Returns `false` if it did not exist.
    fn drop_database(&self, db: &str) -> Result<bool, StoreError>;

    /// Collection names in `db`, sorted. An unknown database has none.
    fn list_collections(&self, db: &str) -> Result<Vec<String>, StoreError>;

    fn collection_stats(&self, db: &str, collection: &str) -> Result<CollectionInfo, StoreError>;

    /// Fails with [`StoreError::NamespaceExists`] if the collection exists.
    fn create_collection(&self, db: &str, collection: &str) -> Result<(), StoreError>;

    /// Fails with [`StoreError::NamespaceNotFound`] if the collection is missing.
    fn drop_collection(&self, db: &str, collection: &str) -> Result<(), StoreError>;

    /// Appends `docs`, creating the database and collection on demand.
    fn insert(&self, db: &str, collection: &str, docs: &[Document]) -> Result<usize, StoreError>;

    /// Every document in insertion order. A missing collection is empty.
    fn scan(&self, db: &str, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Removes documents accepted by `predicate`, at most `limit` of them
    /// when given. Returns the number removed.
    fn delete(
        &self,
        db: &str,
        collection: &str,
        predicate: &dyn Fn(&Document) -> bool,
        limit: Option<usize>,
    ) -> Result<usize, StoreError>;
}

pub fn namespace(db: &str, collection: &str) -> String {
    format!("{db}.{collection}")
}
