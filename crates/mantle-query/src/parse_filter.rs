use mantle_document::{Document, Value};
use regex::Regex;

use crate::error::FilterError;
use crate::expression::{Condition, Expression, Member};

/// Parse a filter document into an [`Expression`] tree.
///
/// - The top-level document is an implicit AND of all entries; an empty
///   document matches everything.
/// - `{ "field": value }` is type-strict equality, except that a regex
///   literal means `$regex`.
/// - `{ "field": { "$gt": v, ... } }` uses operator sub-documents.
/// - `$and`, `$or` and `$nor` take non-empty arrays of sub-filters.
pub fn parse_filter(doc: &Document) -> Result<Expression, FilterError> {
    let mut children = Vec::with_capacity(doc.len());

    for (key, value) in doc {
        match key {
            "$and" => children.push(Expression::And(parse_logical_array(key, value)?)),
            "$or" => children.push(Expression::Or(parse_logical_array(key, value)?)),
            "$nor" => children.push(Expression::Nor(parse_logical_array(key, value)?)),
            k if k.starts_with('$') => {
                return Err(FilterError(format!("unknown top-level operator: {k}")));
            }
            _ => children.push(Expression::Field(
                key.to_string(),
                parse_field_condition(value)?,
            )),
        }
    }

    match children.len() {
        1 => Ok(children.remove(0)),
        _ => Ok(Expression::And(children)),
    }
}

fn parse_logical_array(op: &str, value: &Value) -> Result<Vec<Expression>, FilterError> {
    let Value::Array(items) = value else {
        return Err(FilterError(format!("{op} must be an array")));
    };
    if items.is_empty() {
        return Err(FilterError(format!("{op} must be a nonempty array")));
    }

    items
        .iter()
        .map(|item| match item {
            Value::Document(sub) => parse_filter(sub),
            _ => Err(FilterError(format!("{op} elements must be documents"))),
        })
        .collect()
}

fn parse_field_condition(value: &Value) -> Result<Condition, FilterError> {
    match value {
        Value::Regex(re) => Ok(Condition::Regex(compile_regex(&re.pattern, &re.options)?)),
        Value::Document(sub) if is_operator_doc(sub)? => parse_operator_doc(sub),
        _ => Ok(Condition::Equals(value.clone())),
    }
}

/// Whether `doc` is an operator document. Mixing `$`-keys with plain keys
/// is rejected.
fn is_operator_doc(doc: &Document) -> Result<bool, FilterError> {
    let operators = doc.keys().filter(|k| k.starts_with('$')).count();
    if operators != 0 && operators != doc.len() {
        return Err(FilterError::new(
            "operator document mixes operators and field names",
        ));
    }
    Ok(operators != 0)
}

/// Parse an operator sub-document like `{ "$gt": 21, "$lte": 100 }`.
fn parse_operator_doc(doc: &Document) -> Result<Condition, FilterError> {
    let mut conditions = Vec::with_capacity(doc.len());

    for (op, value) in doc {
        let condition = match op {
            "$eq" => Condition::Eq(value.clone()),
            "$ne" => Condition::Ne(value.clone()),
            "$gt" => Condition::Gt(value.clone()),
            "$gte" => Condition::Gte(value.clone()),
            "$lt" => Condition::Lt(value.clone()),
            "$lte" => Condition::Lte(value.clone()),
            "$in" => Condition::In(parse_members(op, value)?),
            "$nin" => Condition::Nin(parse_members(op, value)?),
            "$exists" => Condition::Exists(truthy(value)),
            "$not" => Condition::Not(Box::new(parse_not(value)?)),
            "$regex" => parse_regex(doc)?,
            // Consumed together with `$regex`.
            "$options" if doc.contains_key("$regex") => continue,
            "$options" => return Err(FilterError::new("$options without $regex")),
            k => return Err(FilterError(format!("unknown operator: {k}"))),
        };
        conditions.push(condition);
    }

    match conditions.len() {
        0 => Err(FilterError::new("empty operator document")),
        1 => Ok(conditions.remove(0)),
        _ => Ok(Condition::All(conditions)),
    }
}

fn parse_not(value: &Value) -> Result<Condition, FilterError> {
    match value {
        Value::Document(sub) if sub.is_empty() => Err(FilterError::new("$not cannot be empty")),
        Value::Document(sub) if is_operator_doc(sub)? => parse_operator_doc(sub),
        Value::Regex(re) => Ok(Condition::Regex(compile_regex(&re.pattern, &re.options)?)),
        _ => Ok(Condition::Eq(value.clone())),
    }
}

fn parse_members(op: &str, value: &Value) -> Result<Vec<Member>, FilterError> {
    let Value::Array(items) = value else {
        return Err(FilterError(format!("{op} needs an array")));
    };
    items
        .iter()
        .map(|item| match item {
            Value::Regex(re) => Ok(Member::Pattern(compile_regex(&re.pattern, &re.options)?)),
            other => Ok(Member::Value(other.clone())),
        })
        .collect()
}

/// Parse `$regex` plus an optional `$options` sibling, which overrides any
/// options carried by a regex literal.
fn parse_regex(doc: &Document) -> Result<Condition, FilterError> {
    let options = match doc.get("$options") {
        None => None,
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => return Err(FilterError::new("$options has to be a string")),
    };

    let re = match doc.get("$regex") {
        Some(Value::String(pattern)) => compile_regex(pattern, options.unwrap_or(""))?,
        Some(Value::Regex(re)) => compile_regex(&re.pattern, options.unwrap_or(&re.options))?,
        _ => return Err(FilterError::new("$regex has to be a string")),
    };
    Ok(Condition::Regex(re))
}

pub(crate) fn compile_regex(pattern: &str, options: &str) -> Result<Regex, FilterError> {
    let mut full = String::with_capacity(pattern.len() + options.len() + 4);
    if !options.is_empty() {
        full.push_str("(?");
        for ch in options.chars() {
            match ch {
                'i' | 'm' | 's' | 'x' => full.push(ch),
                c => return Err(FilterError(format!("invalid flag in regex options: {c}"))),
            }
        }
        full.push(')');
    }
    full.push_str(pattern);

    Regex::new(&full).map_err(|e| FilterError(format!("invalid regex pattern: {e}")))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int32(n) => *n != 0,
        Value::Int64(n) => *n != 0,
        Value::Double(n) => *n != 0.0,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mantle_document::{Regex as RegexValue, array, doc};

    #[test]
    fn bare_field_is_type_strict_equality() {
        let expr = parse_filter(&doc! { "status" => "active" }).unwrap();
        match expr {
            Expression::Field(f, Condition::Equals(v)) => {
                assert_eq!(f, "status");
                assert_eq!(v, Value::from("active"));
            }
            _ => panic!("expected Equals, got {:?}", expr),
        }
    }

    #[test]
    fn multiple_fields_become_and() {
        let expr = parse_filter(&doc! { "status" => "active", "age" => 30 }).unwrap();
        match expr {
            Expression::And(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(&children[0], Expression::Field(f, _) if f == "status"));
                assert!(matches!(&children[1], Expression::Field(f, _) if f == "age"));
            }
            _ => panic!("expected And"),
        }
    }

    #[test]
    fn empty_filter_is_empty_and() {
        let expr = parse_filter(&doc! {}).unwrap();
        assert!(matches!(expr, Expression::And(c) if c.is_empty()));
    }

    #[test]
    fn multiple_operators_same_field() {
        let expr = parse_filter(&doc! { "score" => doc! { "$gt" => 50, "$lte" => 100 } }).unwrap();
        match expr {
            Expression::Field(_, Condition::All(conds)) => {
                assert!(matches!(conds[0], Condition::Gt(Value::Int32(50))));
                assert!(matches!(conds[1], Condition::Lte(Value::Int32(100))));
            }
            _ => panic!("expected All"),
        }
    }

    #[test]
    fn regex_literal_is_regex_condition() {
        let expr = parse_filter(&doc! { "name" => RegexValue::new("^john", "i") }).unwrap();
        match expr {
            Expression::Field(_, Condition::Regex(re)) => assert_eq!(re.as_str(), "(?i)^john"),
            _ => panic!("expected Regex"),
        }
    }

    #[test]
    fn options_override_literal_options() {
        let filter = doc! { "name" => doc! { "$regex" => RegexValue::new("a", "i"), "$options" => "m" } };
        match parse_filter(&filter).unwrap() {
            Expression::Field(_, Condition::Regex(re)) => assert_eq!(re.as_str(), "(?m)a"),
            other => panic!("expected Regex, got {:?}", other),
        }
    }

    #[test]
    fn nested_not_keeps_every_layer() {
        let filter = doc! {
            "last_name" => doc! { "$not" => doc! { "$not" => doc! { "$not" => doc! { "$eq" => "GUINESS" } } } }
        };
        let mut depth = 0;
        let Expression::Field(_, mut cond) = parse_filter(&filter).unwrap() else {
            panic!("expected field condition");
        };
        while let Condition::Not(inner) = cond {
            depth += 1;
            cond = *inner;
        }
        assert_eq!(depth, 3);
        assert!(matches!(cond, Condition::Eq(_)));
    }

    #[test]
    fn not_scalar_is_not_equal() {
        let expr = parse_filter(&doc! { "a" => doc! { "$not" => 5 } }).unwrap();
        assert!(matches!(
            expr,
            Expression::Field(_, Condition::Not(inner)) if matches!(*inner, Condition::Eq(Value::Int32(5)))
        ));
    }

    #[test]
    fn embedded_doc_is_equality_value() {
        let expr = parse_filter(&doc! { "address" => doc! { "city" => "Austin" } }).unwrap();
        assert!(matches!(expr, Expression::Field(_, Condition::Equals(Value::Document(_)))));
    }

    #[test]
    fn errors() {
        let cases = [
            (doc! { "$where" => "x" }, "unknown top-level operator"),
            (doc! { "a" => doc! { "$between" => 1 } }, "unknown operator"),
            (doc! { "$or" => 1 }, "must be an array"),
            (doc! { "$and" => array![] }, "nonempty"),
            (doc! { "$nor" => array![1] }, "must be documents"),
            (doc! { "a" => doc! { "$in" => 1 } }, "needs an array"),
            (doc! { "a" => doc! { "$options" => "i" } }, "$options without $regex"),
            (doc! { "a" => doc! { "$regex" => "x", "$options" => "q" } }, "invalid flag"),
            (doc! { "a" => doc! { "$regex" => "[" } }, "invalid regex"),
            (doc! { "a" => doc! { "$gt" => 1, "b" => 2 } }, "mixes"),
            (doc! { "a" => doc! { "$not" => doc! {} } }, "cannot be empty"),
        ];
        for (filter, expected) in cases {
            let err = parse_filter(&filter).unwrap_err();
            assert!(err.0.contains(expected), "{filter:?}: {}", err.0);
        }
    }
}
