//! Document query evaluation: filters, sorting, and projection, all run in
//! memory over [`mantle_document::Document`]s.

mod error;
mod eval;
mod expression;
mod parse_filter;
mod path;
mod projection;
mod query;
mod sort;

pub use error::FilterError;
pub use eval::matches;
pub use expression::{Condition, Expression, Member};
pub use parse_filter::parse_filter;
pub use path::lookup;
pub use projection::Projection;
pub use query::Query;
pub use sort::{Sort, SortDirection, compare_documents, parse_sort, sort_documents};
