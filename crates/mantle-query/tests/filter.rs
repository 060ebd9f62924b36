use mantle_document::{Document, ObjectId, Regex, Value, array, doc};
use mantle_query::{Query, matches, parse_filter, parse_sort};
use rstest::rstest;

fn actor(id: i32, first: &str, last: &str) -> Document {
    let n = id as u8;
    doc! {
        "_id" => ObjectId::from_bytes([0x61, 0x2e, 0xc2, 0x80, 0, 0, 0, n, 0, 0, 0, n]),
        "actor_id" => id,
        "first_name" => first,
        "last_name" => last,
    }
}

fn actors() -> Vec<Document> {
    vec![
        actor(1, "PENELOPE", "GUINESS"),
        actor(2, "NICK", "WAHLBERG"),
        actor(10, "CHRISTIAN", "GABLE"),
        actor(28, "WOODY", "HOFFMAN"),
        actor(61, "CHRISTIAN", "NEESON"),
        actor(62, "JAYNE", "NEESON"),
        actor(79, "MAE", "HOFFMAN"),
        actor(100, "SPENCER", "DEPP"),
        actor(169, "KENNETH", "HOFFMAN"),
    ]
}

/// Runs `filter` sorted by `actor_id` and returns the matching ids.
fn run(filter: Document, limit: Option<usize>) -> Vec<i32> {
    let mut query = Query::new(parse_filter(&filter).unwrap());
    query.sort = parse_sort(&doc! { "actor_id" => 1 }).unwrap();
    query.limit = limit;
    query
        .execute(actors())
        .iter()
        .filter_map(|d| match d.get("actor_id") {
            Some(Value::Int32(n)) => Some(*n),
            _ => None,
        })
        .collect()
}

#[rstest]
#[case::value_lt_gt(
    doc! { "last_name" => "HOFFMAN", "actor_id" => doc! { "$gt" => 50, "$lt" => 100 } },
    vec![79]
)]
#[case::boundary_is_exclusive(doc! { "actor_id" => doc! { "$gt" => 79, "$lt" => 100 } }, vec![])]
#[case::in_lte_gte(
    doc! {
        "last_name" => doc! { "$in" => array!["HOFFMAN"] },
        "actor_id" => doc! { "$gte" => 50, "$lte" => 100 },
    },
    vec![79]
)]
#[case::nin_eq_ne(
    doc! {
        "last_name" => doc! { "$nin" => array!["NEESON"], "$ne" => "AKROYD" },
        "first_name" => doc! { "$eq" => "CHRISTIAN" },
    },
    vec![10]
)]
#[case::and_or(
    doc! {
        "$and" => array![
            doc! { "first_name" => "CHRISTIAN" },
            doc! { "$or" => array![doc! { "last_name" => "GABLE" }, doc! { "last_name" => "NEESON" }] },
        ]
    },
    vec![10, 61]
)]
#[case::nor(
    doc! {
        "$nor" => array![
            doc! { "actor_id" => doc! { "$gt" => 2 } },
            doc! { "first_name" => "PENELOPE" },
        ]
    },
    vec![2]
)]
#[case::mixed_combinator_and_field(
    doc! { "last_name" => "NEESON", "$or" => array![doc! { "first_name" => "JAYNE" }] },
    vec![62]
)]
#[case::empty_filter_matches_all(doc! {}, vec![1, 2, 10, 28, 61, 62, 79, 100, 169])]
fn finds(#[case] filter: Document, #[case] expected: Vec<i32>) {
    assert_eq!(run(filter, None), expected);
}

#[rstest]
#[case::not(doc! { "last_name" => doc! { "$not" => doc! { "$eq" => "GUINESS" } } })]
#[case::nested_not(doc! {
    "last_name" => doc! { "$not" => doc! { "$not" => doc! { "$not" => doc! { "$eq" => "GUINESS" } } } }
})]
fn negation_skips_first_actor(#[case] filter: Document) {
    assert_eq!(run(filter, Some(1)), vec![2]);
}

#[rstest]
#[case::value_regex(doc! { "last_name" => Regex::new("hoffman", "i") })]
#[case::regex(doc! { "last_name" => doc! { "$regex" => Regex::new("hoffman", "i") } })]
#[case::regex_options(doc! { "last_name" => doc! { "$regex" => Regex::new("hoffman", ""), "$options" => "i" } })]
#[case::regex_string_options(doc! { "last_name" => doc! { "$regex" => "hoffman", "$options" => "i" } })]
fn regex_forms_agree(#[case] filter: Document) {
    assert_eq!(run(filter, Some(1)), vec![28]);
}

#[test]
fn regex_without_case_flag_is_case_sensitive() {
    assert_eq!(run(doc! { "last_name" => doc! { "$regex" => "hoffman" } }, None), Vec::<i32>::new());
}

#[rstest]
#[case::implicit(doc! { "e" => doc! { "b" => 2, "a" => 1 } })]
#[case::eq(doc! { "e" => doc! { "$eq" => doc! { "b" => 2, "a" => 1 } } })]
#[case::in_list(doc! { "e" => doc! { "$in" => array![doc! { "b" => 2, "a" => 1 }] } })]
#[case::gte_lte(doc! {
    "e" => doc! { "$gte" => doc! { "b" => 2, "a" => 1 }, "$lte" => doc! { "a" => 1, "b" => 2 } },
})]
fn embedded_documents_match_in_any_field_order(#[case] filter: Document) {
    let doc = doc! { "e" => doc! { "a" => 1, "b" => 2 } };
    assert!(matches(&doc, &parse_filter(&filter).unwrap()), "{filter:?}");

    let other = doc! { "e" => doc! { "a" => 1, "b" => 3 } };
    assert!(!matches(&other, &parse_filter(&filter).unwrap()), "{filter:?}");
}

#[test]
fn nan_matches_nan() {
    let doc = doc! { "score" => f64::NAN };
    assert!(matches(&doc, &parse_filter(&doc! { "score" => f64::NAN }).unwrap()));
    assert!(matches(&doc, &parse_filter(&doc! { "score" => doc! { "$eq" => f64::NAN } }).unwrap()));
    assert!(!matches(&doc, &parse_filter(&doc! { "score" => doc! { "$ne" => f64::NAN } }).unwrap()));
}
