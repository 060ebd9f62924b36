use mantle_document::{Array, Document, Value};
use tracing::debug;

use crate::dispatch::{CommandError, ErrorCode, Request};

use super::HANDLERS_TARGET;

/// The collection named by the command's own value, as in `{find: "actor"}`.
pub(crate) fn collection_name<'a>(req: &Request<'a>) -> Result<&'a str, CommandError> {
    let name = req.command_name();
    match req.command_value() {
        Some(Value::String(coll)) if !coll.is_empty() => Ok(coll.as_str()),
        Some(Value::String(_)) => Err(CommandError::new(
            ErrorCode::BadValue,
            format!("Invalid namespace specified '{}.'", req.db().unwrap_or_default()),
        )),
        Some(other) => Err(CommandError::new(
            ErrorCode::TypeMismatch,
            format!(
                "collection name has invalid type {}",
                other.kind().name()
            ),
        )),
        None => Err(CommandError::new(
            ErrorCode::FailedToParse,
            format!("{name}: missing collection name"),
        )),
    }
}

/// Fails if the request carries any of `fields`.
pub(crate) fn unimplemented(req: &Request<'_>, fields: &[&str]) -> Result<(), CommandError> {
    match fields.iter().find(|f| req.document.contains_key(f)) {
        Some(field) => Err(CommandError::new(
            ErrorCode::NotImplemented,
            format!(
                "{}: support for field \"{field}\" is not implemented yet",
                req.command_name()
            ),
        )),
        None => Ok(()),
    }
}

/// Logs and otherwise skips any of `fields` present in the request.
pub(crate) fn ignored(req: &Request<'_>, fields: &[&str]) {
    for field in fields.iter().filter(|f| req.document.contains_key(f)) {
        debug!(
            target: HANDLERS_TARGET,
            command = req.command_name(),
            field,
            "ignoring unsupported field"
        );
    }
}

pub(crate) fn optional_document<'a>(
    req: &Request<'a>,
    key: &str,
) -> Result<Option<&'a Document>, CommandError> {
    match req.document.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Document(doc)) => Ok(Some(doc)),
        Some(other) => Err(type_mismatch(req, key, "object", other)),
    }
}

pub(crate) fn required_array<'a>(req: &Request<'a>, key: &str) -> Result<&'a Array, CommandError> {
    match req.document.get(key) {
        Some(Value::Array(arr)) => Ok(arr),
        Some(other) => Err(type_mismatch(req, key, "array", other)),
        None => Err(CommandError::new(
            ErrorCode::FailedToParse,
            format!("{}: required parameter \"{key}\" is missing", req.command_name()),
        )),
    }
}

/// A whole, non-negative number such as `skip`. Missing or null is `None`.
pub(crate) fn non_negative(req: &Request<'_>, key: &str) -> Result<Option<usize>, CommandError> {
    let value = match req.document.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    let n = value.as_i64().ok_or_else(|| type_mismatch(req, key, "number", value))?;
    if n < 0 {
        return Err(CommandError::new(
            ErrorCode::BadValue,
            format!("{key} value must be non-negative, but received: {n}"),
        ));
    }
    Ok(Some(n as usize))
}

/// `limit` semantics: zero means no limit and a negative value is taken as
/// its magnitude.
pub(crate) fn limit(req: &Request<'_>, key: &str) -> Result<Option<usize>, CommandError> {
    let value = match req.document.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    match value.as_i64() {
        Some(0) => Ok(None),
        Some(n) => Ok(Some(n.unsigned_abs() as usize)),
        None => Err(type_mismatch(req, key, "number", value)),
    }
}

/// Truthiness the way option flags are read: booleans and non-zero numbers.
pub(crate) fn flag(req: &Request<'_>, key: &str) -> bool {
    match req.document.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(v) if v.is_number() => v.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

fn type_mismatch(req: &Request<'_>, key: &str, expected: &str, got: &Value) -> CommandError {
    CommandError::new(
        ErrorCode::TypeMismatch,
        format!(
            "{}: \"{key}\" must be of type {expected}, not {}",
            req.command_name(),
            got.kind().name()
        ),
    )
}

/// Clamps a count to the `int32` fields replies use.
pub(crate) fn int32(n: impl TryInto<i32>) -> i32 {
    n.try_into().unwrap_or(i32::MAX)
}

/// Same for `int64` fields.
pub(crate) fn int64(n: impl TryInto<i64>) -> i64 {
    n.try_into().unwrap_or(i64::MAX)
}
