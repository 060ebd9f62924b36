//! Binary document encoding.
//!
//! Layout: `int32 totalLength | (typeTag cstring-name payload)* | 0x00`, all
//! integers little-endian. Arrays use the document layout with keys
//! `"0"`, `"1"`, ... in order.

use crate::array::Array;
use crate::document::Document;
use crate::error::CodecError;
use crate::object_id::ObjectId;
use crate::value::{Binary, DateTime, Regex, Value};

/// Deepest document/array nesting accepted by the decoder.
pub const MAX_NESTING_DEPTH: usize = 200;

const TAG_DOUBLE: u8 = 0x01;
const TAG_STRING: u8 = 0x02;
const TAG_DOCUMENT: u8 = 0x03;
const TAG_ARRAY: u8 = 0x04;
const TAG_BINARY: u8 = 0x05;
const TAG_OBJECT_ID: u8 = 0x07;
const TAG_BOOL: u8 = 0x08;
const TAG_DATETIME: u8 = 0x09;
const TAG_NULL: u8 = 0x0A;
const TAG_REGEX: u8 = 0x0B;
const TAG_INT32: u8 = 0x10;
const TAG_INT64: u8 = 0x12;

// ── Encoding ────────────────────────────────────────────────

impl Document {
    /// Encodes the document into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(64);
        encode_document(self, &mut out)?;
        Ok(out)
    }

    /// Decodes exactly one document occupying all of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Document, CodecError> {
        let (doc, used) = decode_document(bytes)?;
        if used != bytes.len() {
            return Err(CodecError::TrailingData(bytes.len() - used));
        }
        Ok(doc)
    }
}

/// Appends the encoding of `doc` to `out`.
pub fn encode_document(doc: &Document, out: &mut Vec<u8>) -> Result<(), CodecError> {
    encode_elements(doc.iter(), out)
}

fn encode_array(arr: &Array, out: &mut Vec<u8>) -> Result<(), CodecError> {
    let keys: Vec<String> = (0..arr.len()).map(|i| i.to_string()).collect();
    encode_elements(keys.iter().map(String::as_str).zip(arr.iter()), out)
}

fn encode_elements<'a>(
    elements: impl Iterator<Item = (&'a str, &'a Value)>,
    out: &mut Vec<u8>,
) -> Result<(), CodecError> {
    let start = out.len();
    out.extend_from_slice(&[0; 4]);
    for (key, value) in elements {
        out.push(type_tag(value));
        write_key(key, out)?;
        encode_value(value, out)?;
    }
    out.push(0);

    let len = out.len() - start;
    let len = i32::try_from(len).map_err(|_| CodecError::DocumentTooLarge {
        limit: i32::MAX as usize,
    })?;
    out[start..start + 4].copy_from_slice(&len.to_le_bytes());
    Ok(())
}

fn type_tag(value: &Value) -> u8 {
    match value {
        Value::Double(_) => TAG_DOUBLE,
        Value::String(_) => TAG_STRING,
        Value::Document(_) => TAG_DOCUMENT,
        Value::Array(_) => TAG_ARRAY,
        Value::Binary(_) => TAG_BINARY,
        Value::ObjectId(_) => TAG_OBJECT_ID,
        Value::Bool(_) => TAG_BOOL,
        Value::DateTime(_) => TAG_DATETIME,
        Value::Null => TAG_NULL,
        Value::Regex(_) => TAG_REGEX,
        Value::Int32(_) => TAG_INT32,
        Value::Int64(_) => TAG_INT64,
    }
}

fn encode_value(value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
    match value {
        Value::Null => {}
        Value::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::String(s) => {
            let len = i32::try_from(s.len() + 1).map_err(|_| CodecError::DocumentTooLarge {
                limit: i32::MAX as usize,
            })?;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        Value::Document(doc) => encode_document(doc, out)?,
        Value::Array(arr) => encode_array(arr, out)?,
        Value::Binary(bin) => {
            let len = i32::try_from(bin.bytes.len()).map_err(|_| CodecError::DocumentTooLarge {
                limit: i32::MAX as usize,
            })?;
            out.extend_from_slice(&len.to_le_bytes());
            out.push(bin.subtype);
            out.extend_from_slice(&bin.bytes);
        }
        Value::ObjectId(id) => out.extend_from_slice(&id.bytes()),
        Value::Bool(b) => out.push(u8::from(*b)),
        Value::DateTime(dt) => out.extend_from_slice(&dt.timestamp_millis().to_le_bytes()),
        Value::Regex(re) => {
            write_cstring(&re.pattern, out)
                .map_err(|_| CodecError::malformed("regex pattern contains NUL"))?;
            write_cstring(&re.options, out)
                .map_err(|_| CodecError::malformed("regex options contain NUL"))?;
        }
        Value::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
    }
    Ok(())
}

fn write_key(key: &str, out: &mut Vec<u8>) -> Result<(), CodecError> {
    write_cstring(key, out).map_err(|_| CodecError::InvalidKey(key.to_string()))
}

fn write_cstring(s: &str, out: &mut Vec<u8>) -> Result<(), ()> {
    if s.as_bytes().contains(&0) {
        return Err(());
    }
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    Ok(())
}

// ── Decoding ────────────────────────────────────────────────

/// Decodes one document from the front of `bytes`, returning it along with
/// the number of bytes it occupied.
pub fn decode_document(bytes: &[u8]) -> Result<(Document, usize), CodecError> {
    let len = declared_len(bytes)?;
    let doc = decode_document_at(&bytes[..len], 0)?;
    Ok((doc, len))
}

/// Reads and validates the length prefix of an encoded document.
fn declared_len(bytes: &[u8]) -> Result<usize, CodecError> {
    let prefix: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| CodecError::malformed("truncated length prefix"))?;
    let len = i32::from_le_bytes(prefix);
    if len < 5 {
        return Err(CodecError::malformed(format!("invalid document length {len}")));
    }
    let len = len as usize;
    if len > bytes.len() {
        return Err(CodecError::malformed(format!(
            "document length {len} exceeds available {} bytes",
            bytes.len()
        )));
    }
    Ok(len)
}

/// `bytes` is exactly one encoded document.
fn decode_document_at(bytes: &[u8], depth: usize) -> Result<Document, CodecError> {
    let mut doc = Document::new();
    for element in Elements::new(bytes, depth)? {
        let (key, value) = element?;
        doc.try_insert(key, value)
            .map_err(|e| CodecError::malformed(e.to_string()))?;
    }
    Ok(doc)
}

fn decode_array_at(bytes: &[u8], depth: usize) -> Result<Array, CodecError> {
    let mut arr = Array::new();
    for element in Elements::new(bytes, depth)? {
        let (_, value) = element?;
        arr.push(value);
    }
    Ok(arr)
}

/// Iterator over the elements of one encoded document.
struct Elements<'a> {
    reader: Reader<'a>,
    depth: usize,
    failed: bool,
}

impl<'a> Elements<'a> {
    fn new(bytes: &'a [u8], depth: usize) -> Result<Self, CodecError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(CodecError::malformed(format!(
                "nesting deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }
        match bytes.last() {
            Some(0) => {}
            _ => return Err(CodecError::malformed("missing document terminator")),
        }
        // Skip the length prefix; stop before the terminator.
        Ok(Self {
            reader: Reader::new(&bytes[4..bytes.len() - 1]),
            depth,
            failed: false,
        })
    }

    fn next_element(&mut self) -> Result<(String, Value), CodecError> {
        let tag = self.reader.u8()?;
        let key = self.reader.cstring()?;
        let value = match tag {
            TAG_DOUBLE => Value::Double(f64::from_le_bytes(self.reader.array()?)),
            TAG_STRING => Value::String(self.reader.string()?),
            TAG_DOCUMENT => {
                let sub = self.reader.nested()?;
                Value::Document(decode_document_at(sub, self.depth + 1)?)
            }
            TAG_ARRAY => {
                let sub = self.reader.nested()?;
                Value::Array(decode_array_at(sub, self.depth + 1)?)
            }
            TAG_BINARY => {
                let len = self.reader.i32()?;
                if len < 0 {
                    return Err(CodecError::malformed(format!("negative binary length {len}")));
                }
                let subtype = self.reader.u8()?;
                let bytes = self.reader.take(len as usize)?.to_vec();
                Value::Binary(Binary { subtype, bytes })
            }
            TAG_OBJECT_ID => Value::ObjectId(ObjectId::from_bytes(self.reader.array()?)),
            TAG_BOOL => match self.reader.u8()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                b => return Err(CodecError::malformed(format!("invalid boolean byte {b:#04x}"))),
            },
            TAG_DATETIME => Value::DateTime(DateTime::from_millis(i64::from_le_bytes(
                self.reader.array()?,
            ))),
            TAG_NULL => Value::Null,
            TAG_REGEX => {
                let pattern = self.reader.cstring()?;
                let options = self.reader.cstring()?;
                Value::Regex(Regex { pattern, options })
            }
            TAG_INT32 => Value::Int32(self.reader.i32()?),
            TAG_INT64 => Value::Int64(i64::from_le_bytes(self.reader.array()?)),
            other => {
                return Err(CodecError::malformed(format!(
                    "unsupported element type {other:#04x} for key {key:?}"
                )));
            }
        };
        Ok((key, value))
    }
}

impl Iterator for Elements<'_> {
    type Item = Result<(String, Value), CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.is_empty() {
            return None;
        }
        let result = self.next_element();
        self.failed = result.is_err();
        Some(result)
    }
}

/// Bounds-checked cursor over a byte slice.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                CodecError::malformed(format!(
                    "element needs {n} bytes at offset {}, only {} remain",
                    self.pos,
                    self.buf.len() - self.pos
                ))
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.array::<1>()?[0])
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn cstring(&mut self) -> Result<String, CodecError> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| CodecError::malformed("unterminated cstring"))?;
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|e| CodecError::malformed(format!("invalid UTF-8 in cstring: {e}")))?
            .to_string();
        self.pos += nul + 1;
        Ok(s)
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.i32()?;
        if len < 1 {
            return Err(CodecError::malformed(format!("invalid string length {len}")));
        }
        let raw = self.take(len as usize)?;
        let (body, nul) = raw.split_at(raw.len() - 1);
        if nul != [0] {
            return Err(CodecError::malformed("string missing NUL terminator"));
        }
        std::str::from_utf8(body)
            .map(str::to_string)
            .map_err(|e| CodecError::malformed(format!("invalid UTF-8 in string: {e}")))
    }

    /// Slices out a length-prefixed nested document without decoding it.
    fn nested(&mut self) -> Result<&'a [u8], CodecError> {
        let len = declared_len(&self.buf[self.pos..])?;
        self.take(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{array, doc};

    #[test]
    fn empty_document_is_five_bytes() {
        let bytes = Document::new().to_bytes().unwrap();
        assert_eq!(bytes, [5, 0, 0, 0, 0]);
    }

    #[test]
    fn encodes_int32_field_exactly() {
        let bytes = doc! { "a" => 1 }.to_bytes().unwrap();
        assert_eq!(bytes, [12, 0, 0, 0, 0x10, b'a', 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn arrays_use_index_keys() {
        let bytes = doc! { "x" => array![true] }.to_bytes().unwrap();
        let expected = [
            17, 0, 0, 0, // outer length
            0x04, b'x', 0, // array tag + key
            9, 0, 0, 0, 0x08, b'0', 0, 1, 0, // inner document
            0,
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn round_trip_preserves_order_and_types() {
        let doc = doc! {
            "z" => 1_i64,
            "a" => 1,
            "m" => 1.5,
            "nested" => doc! { "k" => Value::Null, "arr" => array!["s", 2] },
        };
        let decoded = Document::from_bytes(&doc.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, doc);
        assert_eq!(
            decoded.keys().collect::<Vec<_>>(),
            doc.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn rejects_declared_length_beyond_buffer() {
        let mut bytes = doc! { "a" => 1 }.to_bytes().unwrap();
        bytes[0] = 200;
        assert!(matches!(
            Document::from_bytes(&bytes),
            Err(CodecError::MalformedDocument(_))
        ));
    }

    #[test]
    fn rejects_truncated_nested_document() {
        let mut bytes = doc! { "d" => doc! { "a" => 1 } }.to_bytes().unwrap();
        // Inflate the nested length so it overruns its parent.
        bytes[7] = 40;
        assert!(matches!(
            Document::from_bytes(&bytes),
            Err(CodecError::MalformedDocument(_))
        ));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = Document::new().to_bytes().unwrap();
        bytes.push(0xff);
        assert_eq!(Document::from_bytes(&bytes), Err(CodecError::TrailingData(1)));
    }

    #[test]
    fn rejects_duplicate_keys_on_decode() {
        let bytes = [
            19, 0, 0, 0, 0x10, b'a', 0, 1, 0, 0, 0, 0x10, b'a', 0, 2, 0, 0, 0, 0,
        ];
        assert!(matches!(
            Document::from_bytes(&bytes),
            Err(CodecError::MalformedDocument(msg)) if msg.contains("duplicate")
        ));
    }

    #[test]
    fn rejects_unsupported_type_tags() {
        let bytes = [13, 0, 0, 0, 0x11, b'a', 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            Document::from_bytes(&bytes),
            Err(CodecError::MalformedDocument(_))
        ));
    }

    #[test]
    fn rejects_keys_with_nul() {
        let doc = doc! { "a\0b" => 1 };
        assert_eq!(doc.to_bytes(), Err(CodecError::InvalidKey("a\0b".into())));
    }

    #[test]
    fn rejects_excessive_nesting() {
        let mut doc = doc! { "leaf" => 1 };
        for _ in 0..=MAX_NESTING_DEPTH {
            doc = doc! { "n" => doc };
        }
        let bytes = doc.to_bytes().unwrap();
        assert!(Document::from_bytes(&bytes).is_err());
    }
}
