use std::time::Instant;

use mantle_document::{Array, Document, Value, doc};
use mantle_query::parse_filter;
use mantle_store::{StoreError, namespace};

use crate::dispatch::{CommandError, ErrorCode, Request};

use super::common::{collection_name, flag, ignored, int32, optional_document, unimplemented};
use super::database::scale;

const CREATE_UNIMPLEMENTED: &[&str] = &[
    "capped",
    "timeseries",
    "expireAfterSeconds",
    "size",
    "max",
    "validator",
    "validationLevel",
    "validationAction",
    "viewOn",
    "pipeline",
    "collation",
];

const CREATE_IGNORED: &[&str] = &[
    "autoIndexId",
    "storageEngine",
    "indexOptionDefaults",
    "writeConcern",
    "comment",
];

pub(crate) fn create(req: &Request<'_>) -> Result<Document, CommandError> {
    unimplemented(req, CREATE_UNIMPLEMENTED)?;
    ignored(req, CREATE_IGNORED);

    let db = req.db()?;
    let collection = collection_name(req)?;
    req.storage().create_collection(db, collection)?;
    Ok(Document::new())
}

pub(crate) fn drop(req: &Request<'_>) -> Result<Document, CommandError> {
    ignored(req, &["writeConcern", "comment"]);

    let db = req.db()?;
    let collection = collection_name(req)?;
    req.storage().drop_collection(db, collection)?;
    Ok(doc! {
        "nIndexesWas" => 1,
        "ns" => namespace(db, collection),
    })
}

pub(crate) fn list_collections(req: &Request<'_>) -> Result<Document, CommandError> {
    ignored(req, &["authorizedCollections", "comment"]);

    let db = req.db()?;
    let filter = match optional_document(req, "filter")? {
        Some(f) => parse_filter(f)?,
        None => mantle_query::Expression::everything(),
    };
    let name_only = flag(req, "nameOnly");

    let batch: Array = req
        .storage()
        .list_collections(db)?
        .into_iter()
        .map(|name| {
            doc! {
                "name" => name,
                "type" => "collection",
                "options" => Document::new(),
                "info" => doc! { "readOnly" => false },
            }
        })
        .filter(|entry| filter.matches(entry))
        .map(|entry| {
            if name_only {
                let mut slim = Document::new();
                slim.set("name", entry.get("name").cloned().unwrap_or(Value::Null));
                slim.set("type", "collection");
                Value::Document(slim)
            } else {
                Value::Document(entry)
            }
        })
        .collect();

    Ok(doc! {
        "cursor" => doc! {
            "id" => 0i64,
            "ns" => format!("{db}.$cmd.listCollections"),
            "firstBatch" => batch,
        },
    })
}

pub(crate) fn coll_stats(req: &Request<'_>) -> Result<Document, CommandError> {
    let db = req.db()?;
    let collection = collection_name(req)?;
    let scale = scale(req)?;
    let stats = req.storage().collection_stats(db, collection)?;

    let scaled = int32((stats.size as f64 / scale) as u64);
    Ok(doc! {
        "ns" => namespace(db, collection),
        "count" => int32(stats.count),
        "size" => scaled,
        "storageSize" => scaled,
        "totalIndexSize" => 0,
        "totalSize" => scaled,
        "scaleFactor" => scale as i32,
    })
}

/// `{dataSize: "db.coll"}`. An unknown namespace reports zeros.
pub(crate) fn data_size(req: &Request<'_>) -> Result<Document, CommandError> {
    let started = Instant::now();
    let ns = match req.command_value() {
        Some(Value::String(ns)) => ns.as_str(),
        Some(other) => {
            return Err(CommandError::new(
                ErrorCode::TypeMismatch,
                format!("dataSize: namespace must be a string, not {}", other.kind().name()),
            ));
        }
        None => "",
    };
    let Some((db, collection)) = ns.split_once('.').filter(|(d, c)| !d.is_empty() && !c.is_empty()) else {
        return Err(CommandError::new(
            ErrorCode::BadValue,
            format!("Invalid namespace specified '{ns}'"),
        ));
    };

    let (size, count) = match req.storage().collection_stats(db, collection) {
        Ok(stats) => (stats.size, stats.count),
        Err(StoreError::NamespaceNotFound(_)) => (0, 0),
        Err(e) => return Err(e.into()),
    };
    Ok(doc! {
        "estimate" => false,
        "size" => int32(size),
        "numObjects" => int32(count),
        "millis" => int32(started.elapsed().as_millis()),
    })
}
