use mantle_document::{Array, Document, Value, doc};

use crate::dispatch::{CommandError, ErrorCode, Request};

use super::common::{flag, int32, int64};

pub(crate) fn list_databases(req: &Request<'_>) -> Result<Document, CommandError> {
    let databases = req.storage().list_databases()?;
    let name_only = flag(req, "nameOnly");

    let total: u64 = databases.iter().map(|db| db.size).sum();
    let list: Array = databases
        .iter()
        .map(|db| {
            let entry = if name_only {
                doc! { "name" => db.name.as_str() }
            } else {
                doc! {
                    "name" => db.name.as_str(),
                    "sizeOnDisk" => int64(db.size),
                    "empty" => db.is_empty(),
                }
            };
            Value::Document(entry)
        })
        .collect();

    if name_only {
        return Ok(doc! { "databases" => list });
    }
    Ok(doc! {
        "databases" => list,
        "totalSize" => int64(total),
        "totalSizeMb" => int64(total / 1024 / 1024),
    })
}

pub(crate) fn drop_database(req: &Request<'_>) -> Result<Document, CommandError> {
    let db = req.db()?;
    if req.storage().drop_database(db)? {
        Ok(doc! { "dropped" => db })
    } else {
        Ok(Document::new())
    }
}

pub(crate) fn db_stats(req: &Request<'_>) -> Result<Document, CommandError> {
    let db = req.db()?;
    let scale = scale(req)?;
    let stats = req.storage().database_stats(db)?;

    let size = stats.size as f64;
    let avg = match stats.objects {
        0 => 0.0,
        n => size / n as f64,
    };
    Ok(doc! {
        "db" => db,
        "collections" => int32(stats.collections),
        "views" => 0,
        "objects" => int32(stats.objects),
        "avgObjSize" => avg,
        "dataSize" => size / scale,
        "indexes" => 0,
        "indexSize" => 0.0,
        "totalSize" => size / scale,
        "scaleFactor" => scale,
    })
}

/// The optional `scale` divisor shared by the stats commands.
pub(crate) fn scale(req: &Request<'_>) -> Result<f64, CommandError> {
    match req.document.get("scale") {
        None | Some(Value::Null) => Ok(1.0),
        Some(v) => match v.as_f64() {
            Some(s) if s >= 1.0 => Ok(s.trunc()),
            Some(_) => Err(CommandError::new(ErrorCode::BadValue, "Scale factor must be greater than zero")),
            None => Err(CommandError::new(
                ErrorCode::TypeMismatch,
                format!("scale must be a number, not {}", v.kind().name()),
            )),
        },
    }
}
