use std::cmp::Ordering;

use mantle_document::{Document, Value, compare_values};

use crate::error::FilterError;
use crate::path::lookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Parse a sort document such as `{ "actor_id": 1, "name": -1 }`.
pub fn parse_sort(doc: &Document) -> Result<Vec<Sort>, FilterError> {
    doc.iter()
        .map(|(field, value)| {
            let direction = match value.as_i64() {
                Some(1) => SortDirection::Asc,
                Some(-1) => SortDirection::Desc,
                _ => {
                    return Err(FilterError(format!(
                        "invalid sort value for {field}: expected 1 or -1"
                    )));
                }
            };
            Ok(Sort {
                field: field.to_string(),
                direction,
            })
        })
        .collect()
}

/// The value a document sorts by for one key: missing is null, and an
/// array sorts by its smallest element ascending or its largest descending.
fn sort_value<'a>(doc: &'a Document, sort: &Sort) -> &'a Value {
    const NULL: &Value = &Value::Null;

    let candidates = lookup(doc, &sort.field)
        .into_iter()
        .flat_map(|v: &'a Value| match v {
            Value::Array(items) if !items.is_empty() => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        });
    let picked = match sort.direction {
        SortDirection::Asc => candidates.min_by(|a, b| compare_values(a, b)),
        SortDirection::Desc => candidates.max_by(|a, b| compare_values(a, b)),
    };
    picked.unwrap_or(NULL)
}

pub fn compare_documents(a: &Document, b: &Document, sorts: &[Sort]) -> Ordering {
    for sort in sorts {
        let ord = compare_values(sort_value(a, sort), sort_value(b, sort));
        let ord = match sort.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Stable in-place sort.
pub fn sort_documents(docs: &mut [Document], sorts: &[Sort]) {
    if !sorts.is_empty() {
        docs.sort_by(|a, b| compare_documents(a, b, sorts));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mantle_document::{array, doc};

    fn ids(docs: &[Document]) -> Vec<i32> {
        docs.iter()
            .map(|d| match d.get("id") {
                Some(Value::Int32(n)) => *n,
                _ => -1,
            })
            .collect()
    }

    #[test]
    fn parses_directions() {
        let sorts = parse_sort(&doc! { "a" => 1, "b" => -1_i64, "c" => 1.0 }).unwrap();
        assert_eq!(sorts[0].direction, SortDirection::Asc);
        assert_eq!(sorts[1].direction, SortDirection::Desc);
        assert_eq!(sorts[2].direction, SortDirection::Asc);
        assert!(parse_sort(&doc! { "a" => 2 }).is_err());
        assert!(parse_sort(&doc! { "a" => "asc" }).is_err());
    }

    #[test]
    fn multi_key_with_missing_as_null() {
        let mut docs = vec![
            doc! { "id" => 1, "g" => "b", "n" => 2 },
            doc! { "id" => 2, "g" => "a", "n" => 1 },
            doc! { "id" => 3, "n" => 5 },
            doc! { "id" => 4, "g" => "a", "n" => 9 },
        ];
        let sorts = parse_sort(&doc! { "g" => 1, "n" => -1 }).unwrap();
        sort_documents(&mut docs, &sorts);
        assert_eq!(ids(&docs), vec![3, 4, 2, 1]);
    }

    #[test]
    fn mixed_types_follow_type_order() {
        let mut docs = vec![
            doc! { "id" => 1, "v" => true },
            doc! { "id" => 2, "v" => "s" },
            doc! { "id" => 3, "v" => 2.5 },
            doc! { "id" => 4, "v" => Value::Null },
        ];
        sort_documents(&mut docs, &parse_sort(&doc! { "v" => 1 }).unwrap());
        assert_eq!(ids(&docs), vec![4, 3, 2, 1]);
    }

    #[test]
    fn arrays_sort_by_extreme_element() {
        let mut docs = vec![
            doc! { "id" => 1, "v" => array![5, 1] },
            doc! { "id" => 2, "v" => 3 },
        ];
        sort_documents(&mut docs, &parse_sort(&doc! { "v" => 1 }).unwrap());
        assert_eq!(ids(&docs), vec![1, 2]);
        sort_documents(&mut docs, &parse_sort(&doc! { "v" => -1 }).unwrap());
        assert_eq!(ids(&docs), vec![1, 2]);
    }
}
