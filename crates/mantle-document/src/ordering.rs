use std::cmp::Ordering;

use crate::document::Document;
use crate::value::Value;

/// Position of a value's type in the cross-type sort order.
///
/// Numbers of every width share one rank and compare by numeric value.
pub fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 1,
        Value::Int32(_) | Value::Int64(_) | Value::Double(_) => 2,
        Value::String(_) => 3,
        Value::Document(_) => 4,
        Value::Array(_) => 5,
        Value::Binary(_) => 6,
        Value::ObjectId(_) => 7,
        Value::Bool(_) => 8,
        Value::DateTime(_) => 9,
        Value::Regex(_) => 10,
    }
}

/// Total order over all values.
///
/// Values of different type ranks order by rank. Within the numeric rank,
/// `Int32`, `Int64` and `Double` compare exactly by value; NaN sorts below
/// every other number and equal to itself.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::String(x), Value::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Value::Document(x), Value::Document(y)) => compare_documents(x, y),
        (Value::Array(x), Value::Array(y)) => {
            for (ex, ey) in x.iter().zip(y.iter()) {
                let ord = compare_values(ex, ey);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Binary(x), Value::Binary(y)) => x
            .bytes
            .len()
            .cmp(&y.bytes.len())
            .then(x.subtype.cmp(&y.subtype))
            .then_with(|| x.bytes.cmp(&y.bytes)),
        (Value::ObjectId(x), Value::ObjectId(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::DateTime(x), Value::DateTime(y)) => x.cmp(y),
        (Value::Regex(x), Value::Regex(y)) => x
            .pattern
            .cmp(&y.pattern)
            .then_with(|| x.options.cmp(&y.options)),
        _ => compare_numbers(a, b),
    }
}

/// Documents compare field by field in key order, so two documents holding
/// the same fields in different insertion orders compare `Equal`, matching
/// `Document` equality.
fn compare_documents(x: &Document, y: &Document) -> Ordering {
    let (xs, ys) = (sorted_fields(x), sorted_fields(y));
    for ((kx, vx), (ky, vy)) in xs.iter().zip(ys.iter()) {
        let ord = kx
            .as_bytes()
            .cmp(ky.as_bytes())
            .then_with(|| compare_values(vx, vy));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    xs.len().cmp(&ys.len())
}

fn sorted_fields(doc: &Document) -> Vec<(&str, &Value)> {
    let mut fields: Vec<_> = doc.iter().collect();
    fields.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
    fields
}

fn compare_numbers(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int32(x), Value::Int32(y)) => x.cmp(y),
        (Value::Int32(x), Value::Int64(y)) => i64::from(*x).cmp(y),
        (Value::Int64(x), Value::Int32(y)) => x.cmp(&i64::from(*y)),
        (Value::Int64(x), Value::Int64(y)) => x.cmp(y),
        (Value::Double(x), Value::Double(y)) => compare_doubles(*x, *y),
        (Value::Int32(x), Value::Double(y)) => compare_int_double(i64::from(*x), *y),
        (Value::Int64(x), Value::Double(y)) => compare_int_double(*x, *y),
        (Value::Double(x), Value::Int32(y)) => compare_int_double(i64::from(*y), *x).reverse(),
        (Value::Double(x), Value::Int64(y)) => compare_int_double(*y, *x).reverse(),
        _ => Ordering::Equal,
    }
}

fn compare_doubles(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

/// Exact comparison of an integer against a double.
fn compare_int_double(i: i64, d: f64) -> Ordering {
    if d.is_nan() {
        return Ordering::Greater;
    }
    if d.is_infinite() {
        return if d > 0.0 { Ordering::Less } else { Ordering::Greater };
    }
    let truncated = d.trunc();
    // Any finite double with |d| < 2^127 fits an i128 exactly once truncated.
    let whole = truncated as i128;
    match i128::from(i).cmp(&whole) {
        Ordering::Equal => {
            let frac = d - truncated;
            if frac > 0.0 {
                Ordering::Less
            } else if frac < 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        ord => ord,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Binary, DateTime, ObjectId, Regex, array, doc};

    fn one_of_each() -> Vec<Value> {
        vec![
            Value::Null,
            Value::Int32(5),
            Value::from("abc"),
            Value::Document(doc! { "a" => 1 }),
            Value::Array(array![1]),
            Value::Binary(Binary::generic(vec![1, 2])),
            Value::ObjectId(ObjectId::from_bytes([0; 12])),
            Value::Bool(false),
            Value::DateTime(DateTime::from_millis(0)),
            Value::Regex(Regex::new("a", "")),
        ]
    }

    #[test]
    fn cross_type_order_follows_rank_table() {
        let values = one_of_each();
        for pair in values.windows(2) {
            assert_eq!(
                compare_values(&pair[0], &pair[1]),
                Ordering::Less,
                "{:?} < {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn numbers_compare_by_value_across_widths() {
        assert_eq!(compare_values(&Value::Int32(1), &Value::Double(1.0)), Ordering::Equal);
        assert_eq!(compare_values(&Value::Int64(2), &Value::Double(1.5)), Ordering::Greater);
        assert_eq!(compare_values(&Value::Double(-0.5), &Value::Int32(0)), Ordering::Less);
        assert_eq!(compare_values(&Value::Int32(7), &Value::Int64(7)), Ordering::Equal);
    }

    #[test]
    fn large_integers_compare_exactly_against_doubles() {
        let big = 1_i64 << 53;
        assert_eq!(
            compare_values(&Value::Int64(big + 1), &Value::Double(big as f64)),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(&Value::Int64(i64::MAX), &Value::Double(9.223372036854775808e18)),
            Ordering::Less
        );
    }

    #[test]
    fn nan_sorts_below_numbers() {
        assert_eq!(compare_values(&Value::Double(f64::NAN), &Value::Int32(i32::MIN)), Ordering::Less);
        assert_eq!(compare_values(&Value::Double(f64::NAN), &Value::Double(f64::NAN)), Ordering::Equal);
        assert_eq!(compare_values(&Value::Null, &Value::Double(f64::NAN)), Ordering::Less);
    }

    #[test]
    fn documents_compare_regardless_of_field_order() {
        let a = Value::Document(doc! { "a" => 1, "b" => 2 });
        let b = Value::Document(doc! { "b" => 2, "a" => 1 });
        assert_eq!(a, b);
        assert_eq!(compare_values(&a, &b), Ordering::Equal);

        let c = Value::Document(doc! { "b" => 3, "a" => 1 });
        assert_eq!(compare_values(&a, &c), Ordering::Less);
        assert_eq!(compare_values(&c, &a), Ordering::Greater);
    }

    #[test]
    fn nan_equals_itself() {
        let nan = Value::Double(f64::NAN);
        assert_eq!(nan, Value::Double(f64::NAN));
        assert_ne!(nan, Value::Double(0.0));
        assert_eq!(Value::Double(-0.0), Value::Double(0.0));
    }

    #[test]
    fn arrays_compare_elementwise_then_by_length() {
        let a = Value::Array(array![1, 2]);
        let b = Value::Array(array![1, 3]);
        let c = Value::Array(array![1, 2, 0]);
        assert_eq!(compare_values(&a, &b), Ordering::Less);
        assert_eq!(compare_values(&a, &c), Ordering::Less);
    }
}
