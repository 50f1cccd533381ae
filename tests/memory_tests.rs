// tests/memory_tests.rs

mod common;

use odata_expr::{Predicate, Primitive, Projection};

use common::{memory_ids, orders, predicate};

fn selected(text: &str) -> Vec<i64> {
    memory_ids(&predicate(text), &orders())
}

/// The three-valued result for the order with `id`.
fn value_for(text: &str, id: i64) -> Primitive {
    let records = orders();
    let record = records
        .iter()
        .find(|r| r.primitive("id").as_i64() == Some(id))
        .unwrap();
    predicate(text).value(record)
}

// ============================================================================
// Comparison and logic
// ============================================================================

#[test]
fn test_comparisons() {
    assert_eq!(selected("age gt 30"), vec![2]);
    assert_eq!(selected("age ge 30 and active"), vec![1, 4]);
    assert_eq!(selected("customer eq 'Zed'"), vec![5]);
    assert_eq!(selected("name eq 'Dave O''Neil'"), vec![4]);
}

#[test]
fn test_equality_is_null_safe() {
    assert_eq!(selected("name eq null"), vec![5]);
    assert_eq!(selected("name ne null"), vec![1, 2, 3, 4]);
    assert_eq!(selected("color ne 'Red'"), vec![2, 3, 4]);
    assert_eq!(value_for("age eq null", 3), Primitive::Boolean(true));
}

#[test]
fn test_kleene_logic() {
    assert_eq!(selected("age gt 40 or active"), vec![1, 2, 4]);
    assert_eq!(selected("not (age gt 40)"), vec![1, 4, 5]);
    assert_eq!(selected("active or age eq null"), vec![1, 3, 4]);

    assert_eq!(value_for("age gt 40", 3), Primitive::Null);
    assert_eq!(value_for("age gt 40 and active", 3), Primitive::Null);
    assert_eq!(value_for("age gt 40 and false", 3), Primitive::Boolean(false));
    assert_eq!(value_for("age gt 40 or true", 3), Primitive::Boolean(true));
    assert_eq!(value_for("not (age gt 40)", 3), Primitive::Null);
}

#[test]
fn test_membership() {
    assert_eq!(selected("color in ('Green', 'Blue')"), vec![2, 3]);
    assert_eq!(selected("age in (18, 45)"), vec![2, 5]);
    assert_eq!(value_for("age in (18, 45)", 3), Primitive::Null);
}

// ============================================================================
// Arithmetic
// ============================================================================

#[test]
fn test_arithmetic() {
    assert_eq!(selected("price mul 2 gt 100"), vec![2, 5]);
    assert_eq!(selected("age add 1 eq 31"), vec![1, 4]);
    assert_eq!(selected("age mod 7 eq 2"), vec![1, 4]);
    assert_eq!(selected("age div 7 eq 4"), vec![1, 4]);
    assert_eq!(selected("age divby 4 eq 7.5"), vec![1, 4]);
    assert_eq!(selected("rating mul 2 ge 9"), vec![1, 4]);
    assert_eq!(selected("-age lt -40"), vec![2]);
}

#[test]
fn test_division_by_zero_and_overflow_are_null() {
    assert_eq!(selected("age div 0 eq null"), vec![1, 2, 3, 4, 5]);
    assert_eq!(selected("rating div 0 eq null"), vec![1, 2, 3, 4, 5]);
    assert_eq!(selected("age mul 9223372036854775807 gt 0"), Vec::<i64>::new());
    assert_eq!(value_for("age add 1 gt 0", 3), Primitive::Null);
}

// ============================================================================
// String functions
// ============================================================================

#[test]
fn test_string_functions() {
    assert_eq!(selected("contains(name, 'a')"), vec![3, 4]);
    assert_eq!(selected("startswith(customer, 'ACME')"), vec![1, 4]);
    assert_eq!(selected("endswith(name, 'e')"), vec![1]);
    assert_eq!(selected("length(name) eq 3"), vec![2]);
    assert_eq!(selected("indexof(name, 'o') eq 1"), vec![2]);
    assert_eq!(selected("substring(name, 1, 3) eq 'lic'"), vec![1]);
    assert_eq!(selected("substring(name, 2) eq 'rol'"), vec![3]);
    assert_eq!(selected("tolower(name) eq 'alice'"), vec![1]);
    assert_eq!(selected("toupper(customer) eq 'ZED'"), vec![5]);
    assert_eq!(selected("trim(concat(' ', name)) eq 'Bob'"), vec![2]);
    assert_eq!(selected("concat(name, customer) eq 'AliceACME Corp'"), vec![1]);
    assert_eq!(selected("matchesPattern(name, '^[A-C]')"), vec![1, 2]);
}

#[test]
fn test_functions_propagate_null() {
    assert_eq!(value_for("contains(name, 'a')", 5), Primitive::Null);
    assert_eq!(value_for("length(name) gt 0", 5), Primitive::Null);
}

// ============================================================================
// Date and time functions
// ============================================================================

#[test]
fn test_date_parts_are_taken_in_utc() {
    assert_eq!(selected("year(created) eq 2022"), vec![5]);
    assert_eq!(selected("month(created) eq 3"), vec![5]);
    assert_eq!(selected("day(created) eq 30"), vec![2]);
    assert_eq!(selected("hour(created) eq 21"), vec![2]);
    assert_eq!(selected("date(created) eq 2022-03-01"), vec![5]);
    assert_eq!(selected("time(created) eq 10:30:00"), vec![1]);
}

#[test]
fn test_date_and_time_columns() {
    assert_eq!(selected("year(ship_date) eq 2020"), vec![1, 4]);
    assert_eq!(selected("hour(cutoff) ge 17"), vec![2, 4]);
    assert_eq!(selected("minute(cutoff) eq 30"), vec![2]);
    assert_eq!(selected("second(cutoff) eq 59"), vec![4]);
    assert_eq!(selected("fractionalseconds(created) eq 0"), vec![1, 2, 4, 5]);
}

#[test]
fn test_offsets_and_durations() {
    assert_eq!(selected("totaloffsetminutes(created) eq 120"), vec![2]);
    assert_eq!(selected("totaloffsetminutes(created) eq -300"), vec![5]);
    assert_eq!(selected("totalseconds(lead) gt 3600"), vec![1, 2]);
    assert_eq!(selected("lead lt duration'PT1H'"), vec![4, 5]);
}

#[test]
fn test_date_time_bounds() {
    assert_eq!(
        selected("created gt mindatetime() and created lt maxdatetime()"),
        vec![1, 2, 4, 5]
    );
    assert_eq!(selected("created lt now()"), vec![1, 2, 4, 5]);
}

// ============================================================================
// Arithmetic functions
// ============================================================================

#[test]
fn test_rounding() {
    assert_eq!(selected("round(rating) eq 5"), vec![1, 4]);
    assert_eq!(selected("floor(price) eq 99"), vec![2]);
    assert_eq!(selected("ceiling(price) eq 11"), vec![1]);
    assert_eq!(selected("round(age) eq 18"), vec![5]);
}

// ============================================================================
// Lambdas
// ============================================================================

#[test]
fn test_any_and_all() {
    assert_eq!(selected("items/any()"), vec![1, 2, 4, 5]);
    assert_eq!(selected("items/any(i:i/qty gt 3)"), vec![2, 5]);
    assert_eq!(selected("items/all(i:i/qty ge 1)"), vec![1, 2, 3, 5]);
    assert_eq!(selected("items/all(i:i/price gt 1)"), vec![1, 2, 3, 5]);
    assert_eq!(
        selected("items/any(i:i/sku eq 'A-9') and items/all(i:i/qty lt 4)"),
        vec![4]
    );
}

#[test]
fn test_lambda_bodies_read_the_root() {
    assert_eq!(selected("items/any(i:i/price gt price)"), vec![1, 4]);
    assert_eq!(selected("items/any(i:$it/age eq 45)"), vec![2]);
    assert_eq!(selected("items/any(i:i/qty mul i/price ge 60)"), vec![2]);
}

#[test]
fn test_lambdas_are_two_valued() {
    assert_eq!(value_for("items/all(i:i/price gt 1)", 4), Primitive::Boolean(false));
    assert_eq!(value_for("items/any(i:i/price eq null)", 4), Primitive::Boolean(true));
    assert_eq!(value_for("items/any(i:i/qty gt 0)", 3), Primitive::Boolean(false));
}

// ============================================================================
// Other types
// ============================================================================

#[test]
fn test_guid_and_temporal_comparisons() {
    assert_eq!(selected("tracking eq c3d4e5f6-a7b8-4c9d-8e0f-1a2b3c4d5e6f"), vec![4]);
    assert_eq!(selected("ship_date lt 2020-01-20"), vec![4]);
    assert_eq!(selected("created ge 2021-06-30T21:45:00Z"), vec![2, 5]);
    assert_eq!(selected("cutoff gt 12:00"), vec![2, 4]);
}

// ============================================================================
// Sharing
// ============================================================================

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn test_compiled_values_are_shareable() {
    assert_send_sync::<Predicate>();
    assert_send_sync::<Projection>();

    let predicate = std::sync::Arc::new(predicate("age gt 20 and items/any(i:i/qty gt 3)"));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let predicate = std::sync::Arc::clone(&predicate);
            std::thread::spawn(move || memory_ids(&predicate, &orders()))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), vec![2]);
    }
}
