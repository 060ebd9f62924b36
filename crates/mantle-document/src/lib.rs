//! Typed, ordered documents and their binary encoding.

mod array;
pub mod codec;
pub mod compat;
mod document;
mod error;
mod object_id;
mod ordering;
mod value;

pub use array::Array;
pub use codec::{MAX_NESTING_DEPTH, decode_document, encode_document};
pub use document::Document;
pub use error::{CodecError, DocumentError};
pub use object_id::ObjectId;
pub use ordering::{compare_values, type_rank};
pub use value::{Binary, DateTime, Regex, Value, ValueKind};
