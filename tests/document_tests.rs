// tests/document_tests.rs

mod common;

use odata_expr::{Backend, CompileError, Computed, Error, compile_compute, compile_filter};
use serde_json::json;

use common::{allowed, document_filter, document_ids, order_type, orders};

fn unsupported(text: &str) -> String {
    let entity = order_type();
    match compile_filter(text, &entity, &allowed(&entity), &Backend::Document) {
        Err(Error::Compile(CompileError::Unsupported { backend, what })) => {
            assert_eq!(backend, "document");
            what
        }
        other => panic!("expected {text} to be unsupported, got {other:?}"),
    }
}

fn selected(text: &str) -> Vec<i64> {
    document_ids(&document_filter(text), &orders())
}

// ============================================================================
// Comparisons and negation
// ============================================================================

#[test]
fn test_comparison() {
    assert_eq!(document_filter("age gt 30"), json!({"age": {"$gt": 30}}));
    assert_eq!(document_filter("30 lt age"), json!({"age": {"$gt": 30}}));
    assert_eq!(document_filter("age eq null"), json!({"age": {"$eq": null}}));
}

#[test]
fn test_negation_is_pushed_to_the_leaves() {
    assert_eq!(document_filter("not (age gt 30)"), json!({"age": {"$lte": 30}}));
    assert_eq!(
        document_filter("not (name eq 'a' or age lt 5)"),
        json!({"$and": [{"name": {"$ne": "a"}}, {"age": {"$gte": 5}}]})
    );
    assert_eq!(
        document_filter("not (color in ('Red'))"),
        json!({"color": {"$nin": ["Red"], "$ne": null}})
    );
}

#[test]
fn test_logical_operators_flatten() {
    assert_eq!(
        document_filter("age gt 1 and age lt 9 and active"),
        json!({"$and": [{"age": {"$gt": 1}}, {"age": {"$lt": 9}}, {"active": {"$eq": true}}]})
    );
    assert_eq!(document_filter("not active"), json!({"active": {"$eq": false}}));
}

#[test]
fn test_typed_values() {
    assert_eq!(
        document_filter("price ge 10.5"),
        json!({"price": {"$gte": {"$numberDecimal": "10.5"}}})
    );
    assert_eq!(
        document_filter("created lt 2020-01-01T02:00:00+02:00"),
        json!({"created": {"$lt": {"$date": "2020-01-01T00:00:00.000Z"}}})
    );
    assert_eq!(
        document_filter("tracking eq 0b7e4c8a-1f2d-4e3a-9c5b-6d7e8f9a0b1c"),
        json!({"tracking": {"$eq": {"$uuid": "0b7e4c8a-1f2d-4e3a-9c5b-6d7e8f9a0b1c"}}})
    );
    assert_eq!(document_filter("lead eq duration'PT90S'"), json!({"lead": {"$eq": 90.0}}));
}

// ============================================================================
// String matching
// ============================================================================

#[test]
fn test_string_functions_become_regexes() {
    assert_eq!(document_filter("contains(name, 'x')"), json!({"name": {"$regex": "x"}}));
    assert_eq!(document_filter("startswith(name, 'A.')"), json!({"name": {"$regex": "^A\\."}}));
    assert_eq!(document_filter("endswith(name, 'e')"), json!({"name": {"$regex": "e$"}}));
    assert_eq!(
        document_filter("matchesPattern(name, '^[AB]')"),
        json!({"name": {"$regex": "^[AB]"}})
    );
}

#[test]
fn test_negated_match_skips_nulls() {
    assert_eq!(
        document_filter("contains(name, 'x') eq false"),
        json!({"name": {"$not": {"$regex": "x"}, "$ne": null}})
    );
    assert_eq!(selected("contains(name, 'o') eq false"), vec![1, 4]);
}

// ============================================================================
// Lambdas
// ============================================================================

#[test]
fn test_any_and_all() {
    assert_eq!(
        document_filter("items/any(i:i/price gt 10)"),
        json!({"items": {"$elemMatch": {"price": {"$gt": {"$numberDecimal": "10"}}}}})
    );
    assert_eq!(
        document_filter("items/all(i:i/qty ge 1)"),
        json!({"items": {"$not": {"$elemMatch": {"$nor": [{"qty": {"$gte": 1}}]}}}})
    );
    assert_eq!(document_filter("items/any()"), json!({"items.0": {"$exists": true}}));
    assert_eq!(document_filter("not items/any()"), json!({"items.0": {"$exists": false}}));
}

#[test]
fn test_lambdas_select_documents() {
    assert_eq!(selected("items/any()"), vec![1, 2, 4, 5]);
    assert_eq!(selected("items/any(i:i/price gt 10)"), vec![1, 2, 4]);
    assert_eq!(selected("items/all(i:i/price gt 1)"), vec![1, 2, 3, 5]);
    assert_eq!(selected("not items/all(i:i/qty ge 1)"), vec![4]);
}

// ============================================================================
// Constant folding
// ============================================================================

#[test]
fn test_literal_subtrees_fold() {
    assert_eq!(document_filter("1 add 2 gt 2"), json!({}));
    assert_eq!(document_filter("1 eq 2"), json!({"$nor": [{}]}));
    assert_eq!(document_filter("age gt null"), json!({"$nor": [{}]}));
    assert_eq!(document_filter("not (age gt null)"), json!({"$nor": [{}]}));
    assert_eq!(
        document_filter("age gt 2 mul 3"),
        json!({"age": {"$gt": 6}})
    );
    assert_eq!(
        document_filter("name eq tolower('ABC')"),
        json!({"name": {"$eq": "abc"}})
    );
}

#[test]
fn test_folded_constants_select() {
    assert_eq!(selected("true"), vec![1, 2, 3, 4, 5]);
    assert_eq!(selected("false or age eq 18"), vec![5]);
}

// ============================================================================
// Unsupported constructs
// ============================================================================

#[test]
fn test_unsupported_constructs() {
    assert!(unsupported("age add 1 gt 2").contains("arithmetic"));
    assert!(unsupported("-age lt 0").contains("negation"));
    assert!(unsupported("length(name) eq 3").contains("length"));
    assert!(unsupported("contains(name, customer)").contains("contains"));
    assert!(unsupported("items/any(i:i/price gt price)").contains("price"));
}

// ============================================================================
// $compute
// ============================================================================

#[test]
fn test_compute_projection() {
    let entity = order_type();
    let allowed = allowed(&entity);

    let Computed::Document(projection) =
        compile_compute("name as n, 5 as five, 1 add 2 as three", &entity, &allowed, &Backend::Document).unwrap()
    else {
        panic!("expected a projection");
    };
    assert_eq!(
        projection,
        json!({"n": "$name", "five": {"$literal": 5}, "three": {"$literal": 3}})
    );

    let err = compile_compute("age add 1 as next_age", &entity, &allowed, &Backend::Document).unwrap_err();
    assert!(matches!(err, Error::Compile(CompileError::Unsupported { .. })));

    let err = compile_compute("age gt 1 as adult", &entity, &allowed, &Backend::Document).unwrap_err();
    assert!(err.to_string().contains("adult"));
}
