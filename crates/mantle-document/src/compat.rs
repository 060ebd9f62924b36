//! Conversions to and from the `bson` crate's types.

use bson::spec::BinarySubtype;
use thiserror::Error;

use crate::array::Array;
use crate::document::Document;
use crate::object_id::ObjectId;
use crate::value::{Binary, DateTime, Regex, Value};

/// A `bson` value with no counterpart in the supported type set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported bson element type {0:?}")]
pub struct UnsupportedType(pub bson::spec::ElementType);

impl From<&Value> for bson::Bson {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => bson::Bson::Null,
            Value::Bool(b) => bson::Bson::Boolean(*b),
            Value::Int32(v) => bson::Bson::Int32(*v),
            Value::Int64(v) => bson::Bson::Int64(*v),
            Value::Double(v) => bson::Bson::Double(*v),
            Value::String(s) => bson::Bson::String(s.clone()),
            Value::Binary(bin) => bson::Bson::Binary(bson::Binary {
                subtype: BinarySubtype::from(bin.subtype),
                bytes: bin.bytes.clone(),
            }),
            Value::ObjectId(id) => bson::Bson::ObjectId(bson::oid::ObjectId::from_bytes(id.bytes())),
            Value::DateTime(dt) => {
                bson::Bson::DateTime(bson::DateTime::from_millis(dt.timestamp_millis()))
            }
            Value::Regex(re) => bson::Bson::RegularExpression(bson::Regex {
                pattern: re.pattern.clone(),
                options: re.options.clone(),
            }),
            Value::Document(doc) => bson::Bson::Document(bson::Document::from(doc)),
            Value::Array(arr) => bson::Bson::Array(arr.iter().map(bson::Bson::from).collect()),
        }
    }
}

impl From<&Document> for bson::Document {
    fn from(doc: &Document) -> Self {
        doc.iter()
            .map(|(k, v)| (k.to_string(), bson::Bson::from(v)))
            .collect()
    }
}

impl TryFrom<&bson::Bson> for Value {
    type Error = UnsupportedType;

    fn try_from(value: &bson::Bson) -> Result<Self, Self::Error> {
        Ok(match value {
            bson::Bson::Null => Value::Null,
            bson::Bson::Boolean(b) => Value::Bool(*b),
            bson::Bson::Int32(v) => Value::Int32(*v),
            bson::Bson::Int64(v) => Value::Int64(*v),
            bson::Bson::Double(v) => Value::Double(*v),
            bson::Bson::String(s) => Value::String(s.clone()),
            bson::Bson::Binary(bin) => Value::Binary(Binary {
                subtype: u8::from(bin.subtype),
                bytes: bin.bytes.clone(),
            }),
            bson::Bson::ObjectId(id) => Value::ObjectId(ObjectId::from_bytes(id.bytes())),
            bson::Bson::DateTime(dt) => Value::DateTime(DateTime::from_millis(dt.timestamp_millis())),
            bson::Bson::RegularExpression(re) => {
                Value::Regex(Regex::new(re.pattern.clone(), re.options.clone()))
            }
            bson::Bson::Document(doc) => Value::Document(Document::try_from(doc)?),
            bson::Bson::Array(items) => Value::Array(
                items
                    .iter()
                    .map(Value::try_from)
                    .collect::<Result<Array, _>>()?,
            ),
            other => return Err(UnsupportedType(other.element_type())),
        })
    }
}

impl TryFrom<&bson::Document> for Document {
    type Error = UnsupportedType;

    fn try_from(doc: &bson::Document) -> Result<Self, Self::Error> {
        let mut out = Document::with_capacity(doc.len());
        for (k, v) in doc {
            out.set(k.clone(), Value::try_from(v)?);
        }
        Ok(out)
    }
}

impl TryFrom<bson::Document> for Document {
    type Error = UnsupportedType;

    fn try_from(doc: bson::Document) -> Result<Self, Self::Error> {
        Document::try_from(&doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{array, doc};

    #[test]
    fn converts_both_ways() {
        let ours = doc! {
            "_id" => ObjectId::from_bytes([7; 12]),
            "n" => 3,
            "tags" => array!["a", 1.5],
            "when" => DateTime::from_millis(1_600_000_000_000),
        };
        let theirs = bson::Document::from(&ours);
        assert_eq!(theirs.get_i32("n").unwrap(), 3);
        let back = Document::try_from(&theirs).unwrap();
        assert_eq!(back, ours);
    }

    #[test]
    fn rejects_types_outside_the_supported_set() {
        let theirs = bson::doc! { "ts": bson::Timestamp { time: 1, increment: 2 } };
        assert!(Document::try_from(&theirs).is_err());
    }
}
