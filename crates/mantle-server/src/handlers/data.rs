use mantle_document::{Array, Document, ObjectId, Value, doc};
use mantle_query::{Expression, Projection, Query, parse_filter, parse_sort};
use mantle_store::namespace;

use crate::dispatch::{CommandError, ErrorCode, Request};

use super::common::{
    collection_name, ignored, int32, limit, non_negative, optional_document, required_array, unimplemented,
};

const FIND_UNIMPLEMENTED: &[&str] = &[
    "hint",
    "collation",
    "tailable",
    "awaitData",
    "returnKey",
    "showRecordId",
    "min",
    "max",
];

const FIND_IGNORED: &[&str] = &[
    "batchSize",
    "singleBatch",
    "comment",
    "maxTimeMS",
    "readConcern",
    "noCursorTimeout",
    "allowPartialResults",
];

const WRITE_IGNORED: &[&str] = &["ordered", "writeConcern", "bypassDocumentValidation", "comment"];

pub(crate) fn insert(req: &Request<'_>) -> Result<Document, CommandError> {
    ignored(req, WRITE_IGNORED);

    let db = req.db()?;
    let collection = collection_name(req)?;
    let docs = required_array(req, "documents")?
        .iter()
        .map(|v| match v {
            Value::Document(d) => Ok(with_id_first(d)),
            other => Err(CommandError::new(
                ErrorCode::TypeMismatch,
                format!("insert: documents must be objects, not {}", other.kind().name()),
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let n = req.storage().insert(db, collection, &docs)?;
    Ok(doc! { "n" => int32(n) })
}

/// Copies `doc` with `_id` as its first field, generating one when absent.
fn with_id_first(doc: &Document) -> Document {
    let id = doc
        .get("_id")
        .cloned()
        .unwrap_or_else(|| Value::ObjectId(ObjectId::new()));
    let mut out = Document::with_capacity(doc.len() + 1);
    out.set("_id", id);
    for (key, value) in doc.iter().filter(|(k, _)| *k != "_id") {
        out.set(key, value.clone());
    }
    out
}

pub(crate) fn delete(req: &Request<'_>) -> Result<Document, CommandError> {
    ignored(req, WRITE_IGNORED);

    let db = req.db()?;
    let collection = collection_name(req)?;
    let deletes = required_array(req, "deletes")?;

    let mut n = 0;
    for spec in deletes {
        let Value::Document(spec) = spec else {
            return Err(CommandError::new(
                ErrorCode::TypeMismatch,
                format!("delete: deletes must be objects, not {}", spec.kind().name()),
            ));
        };
        let filter = match spec.get("q") {
            Some(Value::Document(q)) => parse_filter(q)?,
            Some(other) => {
                return Err(CommandError::new(
                    ErrorCode::TypeMismatch,
                    format!("delete: q must be an object, not {}", other.kind().name()),
                ));
            }
            None => {
                return Err(CommandError::new(
                    ErrorCode::FailedToParse,
                    "delete: required parameter \"q\" is missing",
                ));
            }
        };
        let limit = match spec.get("limit").map(|v| (v, v.as_i64())) {
            None => None,
            Some((_, Some(0))) => None,
            Some((_, Some(1))) => Some(1),
            Some((v, _)) => {
                return Err(CommandError::new(
                    ErrorCode::BadValue,
                    format!("The limit field in delete objects must be 0 or 1. Got {v:?}"),
                ));
            }
        };

        n += req
            .storage()
            .delete(db, collection, &|d: &Document| filter.matches(d), limit)?;
    }
    Ok(doc! { "n" => int32(n) })
}

pub(crate) fn find(req: &Request<'_>) -> Result<Document, CommandError> {
    unimplemented(req, FIND_UNIMPLEMENTED)?;
    ignored(req, FIND_IGNORED);

    let db = req.db()?;
    let collection = collection_name(req)?;

    let mut query = Query::new(filter(req, "filter")?);
    if let Some(sort) = optional_document(req, "sort")? {
        query.sort = parse_sort(sort)?;
    }
    if let Some(projection) = optional_document(req, "projection")? {
        query.projection = Projection::parse(projection)?;
    }
    query.skip = non_negative(req, "skip")?.unwrap_or(0);
    query.limit = limit(req, "limit")?;

    let docs = req.storage().scan(db, collection)?;
    let batch: Array = query.execute(docs).into_iter().map(Value::Document).collect();
    Ok(doc! {
        "cursor" => doc! {
            "firstBatch" => batch,
            "id" => 0i64,
            "ns" => namespace(db, collection),
        },
    })
}

pub(crate) fn count(req: &Request<'_>) -> Result<Document, CommandError> {
    unimplemented(req, &["hint", "collation"])?;
    ignored(req, &["readConcern", "comment", "maxTimeMS"]);

    let db = req.db()?;
    let collection = collection_name(req)?;

    let mut query = Query::new(filter(req, "query")?);
    query.skip = non_negative(req, "skip")?.unwrap_or(0);
    query.limit = limit(req, "limit")?;

    let docs = req.storage().scan(db, collection)?;
    Ok(doc! { "n" => int32(query.count(&docs)) })
}

fn filter(req: &Request<'_>, key: &str) -> Result<Expression, CommandError> {
    match optional_document(req, key)? {
        Some(f) => Ok(parse_filter(f)?),
        None => Ok(Expression::everything()),
    }
}
