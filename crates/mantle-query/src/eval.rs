use std::cmp::Ordering;

use mantle_document::{Document, Value, compare_values};
use regex::Regex;

use crate::expression::{Condition, Expression, Member};
use crate::path::lookup;

/// Evaluate whether `doc` matches `expr`. Neither input is modified.
pub fn matches(doc: &Document, expr: &Expression) -> bool {
    match expr {
        Expression::And(children) => children.iter().all(|c| matches(doc, c)),
        Expression::Or(children) => children.iter().any(|c| matches(doc, c)),
        Expression::Nor(children) => !children.iter().any(|c| matches(doc, c)),
        Expression::Field(path, cond) => field_matches(doc, path, cond),
    }
}

fn field_matches(doc: &Document, path: &str, cond: &Condition) -> bool {
    match cond {
        Condition::Not(inner) => !field_matches(doc, path, inner),
        Condition::All(conds) => conds.iter().all(|c| field_matches(doc, path, c)),
        Condition::Exists(expected) => lookup(doc, path).is_empty() != *expected,
        Condition::Ne(v) => !any_value(doc, path, |x| ordered(x, v, Ordering::is_eq)),
        Condition::Nin(members) => !any_value(doc, path, |x| in_matches(x, members)),
        Condition::Equals(v) => any_value(doc, path, |x| equals(x, v)),
        Condition::Eq(v) => any_value(doc, path, |x| ordered(x, v, Ordering::is_eq)),
        Condition::Gt(v) => any_value(doc, path, |x| ordered(x, v, Ordering::is_gt)),
        Condition::Gte(v) => any_value(doc, path, |x| ordered(x, v, Ordering::is_ge)),
        Condition::Lt(v) => any_value(doc, path, |x| ordered(x, v, Ordering::is_lt)),
        Condition::Lte(v) => any_value(doc, path, |x| ordered(x, v, Ordering::is_le)),
        Condition::In(members) => any_value(doc, path, |x| in_matches(x, members)),
        Condition::Regex(re) => any_value(doc, path, |x| regex_matches(x, re)),
    }
}

/// Applies `test` to each value at `path`; an absent path is tested as null.
fn any_value(doc: &Document, path: &str, test: impl Fn(&Value) -> bool) -> bool {
    let found = lookup(doc, path);
    if found.is_empty() {
        return test(&Value::Null);
    }
    found.into_iter().any(test)
}

/// Type-strict deep equality, also satisfied by any element of an array
/// field.
fn equals(field: &Value, literal: &Value) -> bool {
    field == literal
        || field
            .as_array()
            .is_some_and(|items| items.iter().any(|item| item == literal))
}

/// Total-order comparison. An array field satisfies the predicate if any
/// element does; it is compared as a whole only against an array literal.
fn ordered(field: &Value, literal: &Value, predicate: fn(Ordering) -> bool) -> bool {
    if let Value::Array(items) = field {
        if items.iter().any(|item| predicate(compare_values(item, literal))) {
            return true;
        }
        if !matches!(literal, Value::Array(_)) {
            return false;
        }
    }
    predicate(compare_values(field, literal))
}

fn in_matches(field: &Value, members: &[Member]) -> bool {
    members.iter().any(|member| match member {
        Member::Value(v) => equals(field, v),
        Member::Pattern(re) => regex_matches(field, re),
    })
}

fn regex_matches(field: &Value, re: &Regex) -> bool {
    match field {
        Value::String(s) => re.is_match(s),
        Value::Array(items) => items
            .iter()
            .any(|item| matches!(item, Value::String(s) if re.is_match(s))),
        _ => false,
    }
}

impl Expression {
    pub fn matches(&self, doc: &Document) -> bool {
        matches(doc, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_filter;
    use mantle_document::{Regex as RegexValue, array, doc};

    fn check(doc: &Document, filter: Document) -> bool {
        matches(doc, &parse_filter(&filter).unwrap())
    }

    #[test]
    fn implicit_equality_is_type_strict() {
        let d = doc! { "n" => 5 };
        assert!(check(&d, doc! { "n" => 5 }));
        assert!(!check(&d, doc! { "n" => 5_i64 }));
        assert!(!check(&d, doc! { "n" => 5.0 }));
    }

    #[test]
    fn eq_operator_compares_numbers_across_widths() {
        let d = doc! { "n" => 5 };
        assert!(check(&d, doc! { "n" => doc! { "$eq" => 5.0 } }));
        assert!(check(&d, doc! { "n" => doc! { "$eq" => 5_i64 } }));
        assert!(!check(&d, doc! { "n" => doc! { "$ne" => 5.0 } }));
    }

    #[test]
    fn missing_field_is_null() {
        let d = doc! { "a" => 1 };
        assert!(check(&d, doc! { "b" => Value::Null }));
        assert!(check(&d, doc! { "b" => doc! { "$eq" => Value::Null } }));
        assert!(!check(&d, doc! { "b" => doc! { "$exists" => true } }));
        assert!(check(&d, doc! { "b" => doc! { "$lt" => 0 } }));
        assert!(!check(&d, doc! { "b" => doc! { "$regex" => ".*" } }));
    }

    #[test]
    fn cross_type_comparison_uses_type_order() {
        let d = doc! { "v" => "text" };
        assert!(check(&d, doc! { "v" => doc! { "$gt" => 1_000_000 } }));
        assert!(check(&d, doc! { "v" => doc! { "$lt" => true } }));
    }

    #[test]
    fn array_fields_match_elementwise() {
        let d = doc! { "tags" => array!["red", "blue"], "nums" => array![1, 10] };
        assert!(check(&d, doc! { "tags" => "blue" }));
        assert!(check(&d, doc! { "tags" => array!["red", "blue"] }));
        assert!(!check(&d, doc! { "tags" => array!["blue", "red"] }));
        assert!(check(&d, doc! { "nums" => doc! { "$gt" => 5 } }));
        assert!(!check(&d, doc! { "nums" => doc! { "$gt" => 50 } }));
        assert!(check(&d, doc! { "tags" => doc! { "$in" => array!["green", "red"] } }));
        assert!(!check(&d, doc! { "tags" => doc! { "$nin" => array!["red"] } }));
        assert!(check(&d, doc! { "tags" => RegexValue::new("^bl", "") }));
    }

    #[test]
    fn in_accepts_regex_members() {
        let d = doc! { "name" => "HOFFMAN" };
        let filter = doc! { "name" => doc! { "$in" => array![RegexValue::new("hoff", "i")] } };
        assert!(check(&d, filter));
    }

    #[test]
    fn nested_paths() {
        let d = doc! { "address" => doc! { "city" => "Austin", "zip" => 78701 } };
        assert!(check(&d, doc! { "address.city" => "Austin" }));
        assert!(check(&d, doc! { "address.zip" => doc! { "$gte" => 78000 } }));
        assert!(!check(&d, doc! { "address.state" => doc! { "$exists" => true } }));
    }

    #[test]
    fn not_flips_each_layer() {
        let d = doc! { "last_name" => "GUINESS" };
        let inner = doc! { "$eq" => "GUINESS" };
        let once = doc! { "last_name" => doc! { "$not" => inner.clone() } };
        let twice = doc! { "last_name" => doc! { "$not" => doc! { "$not" => inner.clone() } } };
        let thrice = doc! {
            "last_name" => doc! { "$not" => doc! { "$not" => doc! { "$not" => inner } } }
        };
        assert!(!check(&d, once));
        assert!(check(&d, twice));
        assert!(!check(&d, thrice));
    }

    #[test]
    fn combinators_with_field_predicates() {
        let d = doc! { "a" => 1, "b" => 2 };
        assert!(check(&d, doc! { "a" => 1, "$or" => array![doc! { "b" => 3 }, doc! { "b" => 2 }] }));
        assert!(!check(&d, doc! { "a" => 2, "$or" => array![doc! { "b" => 2 }] }));
        assert!(check(&d, doc! { "$nor" => array![doc! { "a" => 3 }, doc! { "b" => 4 }] }));
    }

    #[test]
    fn does_not_mutate_inputs() {
        let d = doc! { "a" => array![1, 2] };
        let filter = doc! { "a" => doc! { "$gt" => 1 } };
        let before = (d.clone(), filter.clone());
        check(&d, filter.clone());
        assert_eq!((d, filter), before);
    }
}
