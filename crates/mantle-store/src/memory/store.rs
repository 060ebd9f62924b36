use std::sync::Arc;

use arc_swap::ArcSwap;
use imbl::OrdMap;
use mantle_document::{CodecError, Document};
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::storage::{CollectionInfo, DatabaseInfo, Storage, namespace};

use super::permits::Permits;

/// Default number of concurrent operations, mirroring a small connection pool.
pub const DEFAULT_MAX_CONNS: usize = 32;

/// A table: encoded rows keyed by insertion sequence, plus a unique index
/// over `_id`.
#[derive(Clone, Default)]
struct Table {
    rows: OrdMap<u64, Arc<Vec<u8>>>,
    ids: OrdMap<Vec<u8>, u64>,
    next_row: u64,
    size: u64,
}

impl Table {
    /// Appends a row. Returns `false`, leaving the table untouched, when
    /// `id` is already taken.
    fn push(&mut self, id: Option<Vec<u8>>, bytes: Vec<u8>) -> bool {
        if let Some(id) = id {
            if self.ids.contains_key(&id) {
                return false;
            }
            self.ids.insert(id, self.next_row);
        }
        self.size += bytes.len() as u64;
        self.rows.insert(self.next_row, Arc::new(bytes));
        self.next_row += 1;
        true
    }
}

/// Index key for a document's `_id`: the encoding of `{_id: value}`, so ids
/// of different types never collide.
fn id_key(doc: &Document) -> Result<Option<Vec<u8>>, CodecError> {
    doc.get("_id")
        .map(|id| {
            let mut key = Document::new();
            key.set("_id", id.clone());
            key.to_bytes()
        })
        .transpose()
}

type Schema = OrdMap<String, Table>;
type Catalog = OrdMap<String, Schema>;

/// In-memory backend. Readers work on an immutable snapshot of the whole
/// catalog; writers serialise on `write_lock` and publish a new snapshot.
pub struct MemoryStore {
    catalog: ArcSwap<Catalog>,
    write_lock: Mutex<()>,
    permits: Permits,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_max_conns(DEFAULT_MAX_CONNS)
    }

    pub fn with_max_conns(max_conns: usize) -> Self {
        Self {
            catalog: ArcSwap::from_pointee(OrdMap::new()),
            write_lock: Mutex::new(()),
            permits: Permits::new(max_conns),
        }
    }

    pub fn max_conns(&self) -> usize {
        self.permits.max()
    }

    pub fn conns_in_use(&self) -> usize {
        self.permits.in_use()
    }

    /// Apply `f` to a private copy of the catalog and publish it if `f`
    /// succeeds. Copies are cheap thanks to structural sharing.
    fn write<T>(&self, f: impl FnOnce(&mut Catalog) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let _permit = self.permits.acquire()?;
        let _guard = self.write_lock.lock();
        let mut catalog = (**self.catalog.load()).clone();
        let out = f(&mut catalog)?;
        self.catalog.store(Arc::new(catalog));
        Ok(out)
    }

    fn read<T>(&self, f: impl FnOnce(&Catalog) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let _permit = self.permits.acquire()?;
        let catalog = self.catalog.load();
        f(&catalog)
    }
}

fn database_info(name: &str, schema: &Schema) -> DatabaseInfo {
    DatabaseInfo {
        name: name.to_string(),
        collections: schema.len(),
        objects: schema.values().map(|t| t.rows.len()).sum(),
        size: schema.values().map(|t| t.size).sum(),
    }
}

fn decode_rows(ns: &str, table: &Table) -> Result<Vec<Document>, StoreError> {
    table
        .rows
        .values()
        .map(|bytes| {
            Document::from_bytes(bytes).map_err(|source| StoreError::Corrupt {
                ns: ns.to_string(),
                source,
            })
        })
        .collect()
}

impl Storage for MemoryStore {
    fn list_databases(&self) -> Result<Vec<DatabaseInfo>, StoreError> {
        self.read(|catalog| {
            Ok(catalog
                .iter()
                .map(|(name, schema)| database_info(name, schema))
                .collect())
        })
    }

    fn database_stats(&self, db: &str) -> Result<DatabaseInfo, StoreError> {
        self.read(|catalog| {
            Ok(match catalog.get(db) {
                Some(schema) => database_info(db, schema),
                None => database_info(db, &Schema::new()),
            })
        })
    }

    fn drop_database(&self, db: &str) -> Result<bool, StoreError> {
        self.write(|catalog| Ok(catalog.remove(db).is_some()))
    }

    fn list_collections(&self, db: &str) -> Result<Vec<String>, StoreError> {
        self.read(|catalog| {
            Ok(catalog
                .get(db)
                .map(|schema| schema.keys().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn collection_stats(&self, db: &str, collection: &str) -> Result<CollectionInfo, StoreError> {
        self.read(|catalog| {
            let table = catalog
                .get(db)
                .and_then(|schema| schema.get(collection))
                .ok_or_else(|| StoreError::NamespaceNotFound(namespace(db, collection)))?;
            Ok(CollectionInfo {
                name: collection.to_string(),
                count: table.rows.len(),
                size: table.size,
            })
        })
    }

    fn create_collection(&self, db: &str, collection: &str) -> Result<(), StoreError> {
        self.write(|catalog| {
            let schema = catalog.entry(db.to_string()).or_default();
            if schema.contains_key(collection) {
                return Err(StoreError::NamespaceExists(namespace(db, collection)));
            }
            schema.insert(collection.to_string(), Table::default());
            Ok(())
        })
    }

    fn drop_collection(&self, db: &str, collection: &str) -> Result<(), StoreError> {
        self.write(|catalog| {
            catalog
                .get_mut(db)
                .and_then(|schema| schema.remove(collection))
                .map(|_| ())
                .ok_or_else(|| StoreError::NamespaceNotFound(namespace(db, collection)))
        })
    }

    fn insert(&self, db: &str, collection: &str, docs: &[Document]) -> Result<usize, StoreError> {
        let encoded = docs
            .iter()
            .map(|doc| -> Result<_, CodecError> { Ok((doc, id_key(doc)?, doc.to_bytes()?)) })
            .collect::<Result<Vec<_>, _>>()?;

        // A failed batch is never published, so inserts are all or nothing.
        self.write(|catalog| {
            let table = catalog
                .entry(db.to_string())
                .or_default()
                .entry(collection.to_string())
                .or_default();
            let n = encoded.len();
            for (doc, id, bytes) in encoded {
                if !table.push(id, bytes) {
                    return Err(StoreError::DuplicateKey {
                        ns: namespace(db, collection),
                        id: doc.get("_id").map(|id| format!("{id:?}")).unwrap_or_default(),
                    });
                }
            }
            Ok(n)
        })
    }

    fn scan(&self, db: &str, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.read(|catalog| match catalog.get(db).and_then(|s| s.get(collection)) {
            Some(table) => decode_rows(&namespace(db, collection), table),
            None => Ok(Vec::new()),
        })
    }

    fn delete(
        &self,
        db: &str,
        collection: &str,
        predicate: &dyn Fn(&Document) -> bool,
        limit: Option<usize>,
    ) -> Result<usize, StoreError> {
        let ns = namespace(db, collection);
        self.write(|catalog| {
            let Some(table) = catalog.get_mut(db).and_then(|s| s.get_mut(collection)) else {
                return Ok(0);
            };

            let mut doomed = Vec::new();
            for (row, bytes) in table.rows.iter() {
                if limit.is_some_and(|l| doomed.len() >= l) {
                    break;
                }
                let doc = Document::from_bytes(bytes).map_err(|source| StoreError::Corrupt {
                    ns: ns.clone(),
                    source,
                })?;
                if predicate(&doc) {
                    doomed.push((*row, id_key(&doc)?));
                }
            }

            for (row, id) in &doomed {
                if let Some(bytes) = table.rows.remove(row) {
                    table.size -= bytes.len() as u64;
                }
                if let Some(id) = id {
                    table.ids.remove(id);
                }
            }
            Ok(doomed.len())
        })
    }
}
