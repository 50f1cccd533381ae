// tests/compute_tests.rs

mod common;

use odata_expr::output::{computed_to_json, to_json};
use odata_expr::{Backend, Computed, Error, JsonOptions, ParseErrorKind, Primitive, Projection, compile_compute};
use rusqlite::params_from_iter;
use serde_json::json;

use common::{allowed, order_type, orders, sqlite, sqlite_params};

fn computed(text: &str, backend: &Backend) -> Computed {
    let entity = order_type();
    compile_compute(text, &entity, &allowed(&entity), backend).unwrap()
}

fn projection(text: &str) -> Projection {
    match computed(text, &Backend::Memory) {
        Computed::Memory(projection) => projection,
        other => panic!("expected a projection, got {other:?}"),
    }
}

// ============================================================================
// In memory
// ============================================================================

#[test]
fn test_values_in_declaration_order() {
    let projection = projection("price mul 2 as double_price, concat(name, '!') as shout, year(created) as y");
    let records = orders();

    assert_eq!(
        projection.values(&records[0]),
        vec![
            ("double_price".to_string(), common::decimal("21")),
            ("shout".to_string(), common::string("Alice!")),
            ("y".to_string(), Primitive::Int32(2020)),
        ]
    );
    assert_eq!(projection.aliases().collect::<Vec<_>>(), vec!["double_price", "shout", "y"]);
}

#[test]
fn test_nulls_propagate() {
    let projection = projection("age add 1 as next_age, length(customer) as len");
    let records = orders();
    let carol = &records[2];

    assert_eq!(
        projection.values(carol),
        vec![
            ("next_age".to_string(), Primitive::Null),
            ("len".to_string(), Primitive::Null),
        ]
    );
}

#[test]
fn test_apply_extends_the_record() {
    let projection = projection("age mul 2 as double_age, items/any(i:i/qty gt 3) as bulk");
    let records = orders();

    let bob = projection.apply(&records[1]);
    assert_eq!(bob.primitive("double_age"), Primitive::Int64(90));
    assert_eq!(bob.primitive("bulk"), Primitive::Boolean(true));
    assert_eq!(bob.primitive("name"), common::string("Bob"));
    assert_eq!(bob.collection("items").len(), 1);
}

#[test]
fn test_memory_output_json() {
    let computed = computed("age add 1 as next_age", &Backend::Memory);
    let records = orders();
    let json = computed_to_json(&computed, &records[..1], JsonOptions::default());
    assert_eq!(json[0]["next_age"], json!(31));
    assert_eq!(json[0]["name"], json!("Alice"));

    let json = computed_to_json(&computed, &records[..1], JsonOptions { ieee754_compatible: true });
    assert_eq!(json[0]["next_age"], json!("31"));
}

// ============================================================================
// SQL
// ============================================================================

#[test]
fn test_sql_select_list_runs() {
    let Computed::Sql(clause) = computed(
        "age add 1 as next_age, length(name) as len, price mul 2 as double_price",
        &Backend::sqlite(),
    ) else {
        panic!("expected a select list");
    };

    let conn = sqlite(&orders());
    let sql = format!("SELECT {} FROM \"orders\" WHERE \"id\" = 1", clause.clause);
    let row: (i64, i64, f64) = conn
        .query_row(&sql, params_from_iter(sqlite_params(&clause)), |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .unwrap();
    assert_eq!(row, (31, 5, 21.0));
}

#[test]
fn test_sql_output_json() {
    let computed = computed("age add 1 as next_age", &Backend::sqlite());
    let json = computed_to_json(&computed, &[], JsonOptions::default());
    assert_eq!(
        to_json(&json),
        r#"{"clause":"\"orders\".\"age\" + ? AS \"next_age\"","params":[1]}"#
    );
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_compute_resolution_errors() {
    let entity = order_type();
    let allowed = allowed(&entity);

    let err = compile_compute("secret as s", &entity, &allowed, &Backend::Memory).unwrap_err();
    assert!(err.is_authorization());

    let err = compile_compute("nope as x", &entity, &allowed, &Backend::Memory).unwrap_err();
    assert!(matches!(err, Error::Parse(e) if e.kind == ParseErrorKind::UnknownProperty("nope".to_string())));

    let err = compile_compute("", &entity, &allowed, &Backend::Memory).unwrap_err();
    assert!(matches!(err, Error::Parse(e) if e.kind == ParseErrorKind::Empty));
}
