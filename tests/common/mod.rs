// tests/common/mod.rs
//
// Shared fixtures: an order/item schema, one dataset mirrored as records, an
// in-memory SQLite database and a document collection, and a small matcher
// for MongoDB-shaped filters.

#![allow(dead_code)]

use std::{cmp::Ordering, sync::Arc};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta};
use odata_expr::{
    AllowList, Backend, Compiled, Dialect, EntityType, EnumType, Expr, Predicate, Primitive, PrimitiveKind, Property,
    Record, SqlClause, SqlValue, compile_filter,
    model::PropertyType,
    parse_filter,
    value::EnumValue,
};
use regex::Regex;
use rusqlite::{Connection, params_from_iter, types::Value as SqliteValue};
use rust_decimal::Decimal;
use serde_json::{Map, Value as Json};
use uuid::Uuid;

// ============================================================================
// Schema
// ============================================================================

pub fn color() -> Arc<EnumType> {
    Arc::new(EnumType::new("Sales.Color", &["Red", "Green", "Blue"]))
}

pub fn item_type() -> Arc<EntityType> {
    Arc::new(
        EntityType::new("Sales.Item", "items")
            .property(Property::primitive("id", PrimitiveKind::Int32).not_null())
            .property(Property::primitive("order_id", PrimitiveKind::Int32))
            .property(Property::primitive("sku", PrimitiveKind::String))
            .property(Property::primitive("price", PrimitiveKind::Decimal))
            .property(Property::primitive("qty", PrimitiveKind::Int32)),
    )
}

pub fn order_type() -> EntityType {
    EntityType::new("Sales.Order", "orders")
        .property(Property::primitive("id", PrimitiveKind::Int32).not_null())
        .property(Property::primitive("name", PrimitiveKind::String))
        .property(Property::primitive("customer", PrimitiveKind::String).with_source("customer_name"))
        .property(Property::primitive("age", PrimitiveKind::Int32))
        .property(Property::primitive("price", PrimitiveKind::Decimal))
        .property(Property::primitive("rating", PrimitiveKind::Double))
        .property(Property::primitive("active", PrimitiveKind::Boolean))
        .property(Property::enumeration("color", color()))
        .property(Property::primitive("created", PrimitiveKind::DateTimeOffset))
        .property(Property::primitive("ship_date", PrimitiveKind::Date))
        .property(Property::primitive("cutoff", PrimitiveKind::TimeOfDay))
        .property(Property::primitive("lead", PrimitiveKind::Duration))
        .property(Property::primitive("tracking", PrimitiveKind::Guid))
        .property(Property::primitive("secret", PrimitiveKind::Int32))
        .property(Property::collection("items", item_type(), "id", "order_id"))
}

/// Every path except `secret`.
pub fn allowed(entity: &EntityType) -> AllowList {
    let all = AllowList::all(entity);
    AllowList::new(all.iter().filter(|path| *path != "secret"))
}

pub fn parse(text: &str) -> Expr {
    let entity = order_type();
    parse_filter(text, &entity, &allowed(&entity)).unwrap()
}

pub fn compile(text: &str, backend: &Backend) -> Compiled {
    let entity = order_type();
    compile_filter(text, &entity, &allowed(&entity), backend).unwrap()
}

pub fn sql(text: &str, backend: &Backend) -> SqlClause {
    match compile(text, backend) {
        Compiled::Sql(clause) => clause,
        other => panic!("expected sql, got {other:?}"),
    }
}

pub fn document_filter(text: &str) -> Json {
    match compile(text, &Backend::Document) {
        Compiled::Document(filter) => filter,
        other => panic!("expected a document filter, got {other:?}"),
    }
}

pub fn predicate(text: &str) -> Predicate {
    match compile(text, &Backend::Memory) {
        Compiled::Memory(predicate) => predicate,
        other => panic!("expected a predicate, got {other:?}"),
    }
}

// ============================================================================
// Values
// ============================================================================

pub fn string(s: &str) -> Primitive {
    Primitive::String(s.to_string())
}

pub fn decimal(text: &str) -> Primitive {
    Primitive::Decimal(text.parse::<Decimal>().unwrap())
}

pub fn instant(text: &str) -> Primitive {
    Primitive::DateTimeOffset(DateTime::parse_from_rfc3339(text).unwrap())
}

pub fn date(text: &str) -> Primitive {
    Primitive::Date(NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap())
}

pub fn time(text: &str) -> Primitive {
    Primitive::TimeOfDay(NaiveTime::parse_from_str(text, "%H:%M:%S").unwrap())
}

pub fn guid(text: &str) -> Primitive {
    Primitive::Guid(Uuid::parse_str(text).unwrap())
}

pub fn color_value(member: &str) -> Primitive {
    Primitive::Enum(EnumValue {
        type_name: "Sales.Color".to_string(),
        members: vec![member.to_string()],
    })
}

// ============================================================================
// Dataset
// ============================================================================

fn item(id: i32, order_id: i32, sku: &str, price: Primitive, qty: i32) -> Record {
    Record::new()
        .with("id", Primitive::Int32(id))
        .with("order_id", Primitive::Int32(order_id))
        .with("sku", string(sku))
        .with("price", price)
        .with("qty", Primitive::Int32(qty))
}

/// Five orders, sorted by id. Order 3 leaves almost everything null and has
/// no items; order 4 has an item with a null price.
pub fn orders() -> Vec<Record> {
    vec![
        Record::new()
            .with("id", Primitive::Int32(1))
            .with("name", string("Alice"))
            .with("customer_name", string("ACME Corp"))
            .with("age", Primitive::Int32(30))
            .with("price", decimal("10.5"))
            .with("rating", Primitive::Double(4.5))
            .with("active", Primitive::Boolean(true))
            .with("color", color_value("Red"))
            .with("created", instant("2020-01-15T10:30:00Z"))
            .with("ship_date", date("2020-01-20"))
            .with("cutoff", time("09:00:00"))
            .with("lead", Primitive::Duration(TimeDelta::hours(2)))
            .with("tracking", guid("0b7e4c8a-1f2d-4e3a-9c5b-6d7e8f9a0b1c"))
            .with("secret", Primitive::Int32(7))
            .with_collection(
                "items",
                vec![item(1, 1, "A-1", decimal("12"), 2), item(2, 1, "B-2", decimal("5"), 1)],
            ),
        Record::new()
            .with("id", Primitive::Int32(2))
            .with("name", string("Bob"))
            .with("customer_name", string("Bobco"))
            .with("age", Primitive::Int32(45))
            .with("price", decimal("99.99"))
            .with("rating", Primitive::Double(3.0))
            .with("active", Primitive::Boolean(false))
            .with("color", color_value("Blue"))
            .with("created", instant("2021-06-30T23:45:00+02:00"))
            .with("ship_date", date("2021-07-02"))
            .with("cutoff", time("17:30:00"))
            .with("lead", Primitive::Duration(TimeDelta::days(1)))
            .with("tracking", guid("5f1c2d3e-4a5b-4c6d-8e7f-9a0b1c2d3e4f"))
            .with("secret", Primitive::Int32(8))
            .with_collection("items", vec![item(3, 2, "C-3", decimal("20"), 5)]),
        Record::new()
            .with("id", Primitive::Int32(3))
            .with("name", string("carol"))
            .with("color", color_value("Green"))
            .with("secret", Primitive::Int32(9))
            .with_collection("items", Vec::new()),
        Record::new()
            .with("id", Primitive::Int32(4))
            .with("name", string("Dave O'Neil"))
            .with("customer_name", string("ACME Ltd"))
            .with("age", Primitive::Int32(30))
            .with("price", decimal("0"))
            .with("rating", Primitive::Double(5.0))
            .with("active", Primitive::Boolean(true))
            .with("created", instant("2019-12-31T23:59:59Z"))
            .with("ship_date", date("2020-01-01"))
            .with("cutoff", time("23:59:59"))
            .with("lead", Primitive::Duration(TimeDelta::minutes(30)))
            .with("tracking", guid("c3d4e5f6-a7b8-4c9d-8e0f-1a2b3c4d5e6f"))
            .with_collection(
                "items",
                vec![item(4, 4, "A-9", Primitive::Null, 3), item(5, 4, "D-4", decimal("15"), 0)],
            ),
        Record::new()
            .with("id", Primitive::Int32(5))
            .with("customer_name", string("Zed"))
            .with("age", Primitive::Int32(18))
            .with("price", decimal("1000"))
            .with("rating", Primitive::Double(1.0))
            .with("active", Primitive::Boolean(false))
            .with("color", color_value("Red"))
            .with("created", instant("2022-02-28T22:00:00-05:00"))
            .with("ship_date", date("2022-03-01"))
            .with("cutoff", time("00:00:00"))
            .with("lead", Primitive::Duration(TimeDelta::zero()))
            .with_collection("items", vec![item(6, 5, "E-5", decimal("7.25"), 4)]),
    ]
}

pub fn ids(records: &[&Record]) -> Vec<i64> {
    records.iter().filter_map(|r| r.primitive("id").as_i64()).collect()
}

pub fn memory_ids(predicate: &Predicate, records: &[Record]) -> Vec<i64> {
    ids(&predicate.filter(records))
}

// ============================================================================
// SQLite
// ============================================================================

fn to_sqlite(value: SqlValue) -> SqliteValue {
    match value {
        SqlValue::Null => SqliteValue::Null,
        SqlValue::Integer(n) => SqliteValue::Integer(n),
        SqlValue::Real(n) => SqliteValue::Real(n),
        SqlValue::Text(s) => SqliteValue::Text(s),
        SqlValue::Blob(bytes) => SqliteValue::Blob(bytes),
        other => panic!("parameter was not lowered for sqlite: {other:?}"),
    }
}

fn scalar_columns(entity: &EntityType) -> Vec<String> {
    entity
        .properties
        .iter()
        .filter(|p| !p.is_collection())
        .map(|p| format!("\"{}\"", p.source))
        .collect()
}

fn insert(conn: &Connection, entity: &EntityType, record: &Record) {
    let sources: Vec<&str> = entity
        .properties
        .iter()
        .filter(|p| !p.is_collection())
        .map(|p| p.source.as_str())
        .collect();
    let sql = format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        entity.source,
        scalar_columns(entity).join(", "),
        vec!["?"; sources.len()].join(", ")
    );
    let values: Vec<SqliteValue> = sources
        .iter()
        .map(|source| to_sqlite(Dialect::Sqlite.bind(record.primitive(source).to_sql_value())))
        .collect();
    conn.execute(&sql, params_from_iter(values)).unwrap();
}

/// The orders and their items as two SQLite tables.
pub fn sqlite(records: &[Record]) -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    let orders = order_type();
    let items = item_type();

    for entity in [&orders, items.as_ref()] {
        let ddl = format!("CREATE TABLE \"{}\" ({})", entity.source, scalar_columns(entity).join(", "));
        conn.execute_batch(&ddl).unwrap();
    }
    for record in records {
        insert(&conn, &orders, record);
        for row in record.collection("items") {
            insert(&conn, &items, row);
        }
    }
    conn
}

pub fn sqlite_params(clause: &SqlClause) -> Vec<SqliteValue> {
    clause.params.iter().cloned().map(to_sqlite).collect()
}

/// Ids of the orders a compiled `WHERE` fragment selects.
pub fn sql_ids(conn: &Connection, clause: &SqlClause) -> Vec<i64> {
    let sql = format!("SELECT \"id\" FROM \"orders\" WHERE {} ORDER BY \"id\"", clause.clause);
    let mut stmt = conn.prepare(&sql).unwrap();
    let ids: Vec<i64> = stmt
        .query_map(params_from_iter(sqlite_params(clause)), |row| row.get::<_, i64>(0))
        .unwrap()
        .map(Result::unwrap)
        .collect();
    ids
}

// ============================================================================
// Documents
// ============================================================================

pub fn document(record: &Record, entity: &EntityType) -> Json {
    let mut map = Map::new();
    for property in &entity.properties {
        let value = match &property.ty {
            PropertyType::Collection { target, .. } => Json::Array(
                record
                    .collection(&property.source)
                    .iter()
                    .map(|row| document(row, target))
                    .collect(),
            ),
            _ => record.primitive(&property.source).to_document_value(),
        };
        map.insert(property.source.clone(), value);
    }
    Json::Object(map)
}

pub fn document_ids(filter: &Json, records: &[Record]) -> Vec<i64> {
    let entity = order_type();
    records
        .iter()
        .filter(|r| matches_document(&document(r, &entity), filter))
        .filter_map(|r| r.primitive("id").as_i64())
        .collect()
}

/// Evaluates the subset of the MongoDB query language the document backend
/// emits.
pub fn matches_document(doc: &Json, filter: &Json) -> bool {
    let Some(conditions) = filter.as_object() else {
        panic!("filter is not an object: {filter}");
    };
    conditions.iter().all(|(key, condition)| match key.as_str() {
        "$and" => list(condition).iter().all(|f| matches_document(doc, f)),
        "$or" => list(condition).iter().any(|f| matches_document(doc, f)),
        "$nor" => !list(condition).iter().any(|f| matches_document(doc, f)),
        path => field_matches(lookup(doc, path), condition),
    })
}

fn list(json: &Json) -> &[Json] {
    json.as_array().map(Vec::as_slice).unwrap_or_else(|| panic!("expected an array: {json}"))
}

fn lookup<'a>(doc: &'a Json, path: &str) -> Option<&'a Json> {
    path.split('.').try_fold(doc, |current, segment| match current {
        Json::Object(map) => map.get(segment),
        Json::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn field_matches(value: Option<&Json>, condition: &Json) -> bool {
    let Some(operators) = condition.as_object() else {
        panic!("expected an operator document: {condition}");
    };
    operators.iter().all(|(op, argument)| operator_matches(value, op, argument))
}

fn operator_matches(value: Option<&Json>, op: &str, argument: &Json) -> bool {
    match op {
        "$eq" => equals(value, argument),
        "$ne" => !equals(value, argument),
        "$gt" => order(value, argument).is_some_and(Ordering::is_gt),
        "$gte" => order(value, argument).is_some_and(Ordering::is_ge),
        "$lt" => order(value, argument).is_some_and(Ordering::is_lt),
        "$lte" => order(value, argument).is_some_and(Ordering::is_le),
        "$in" => list(argument).iter().any(|item| equals(value, item)),
        "$nin" => !list(argument).iter().any(|item| equals(value, item)),
        "$regex" => {
            let pattern = Regex::new(argument.as_str().unwrap()).unwrap();
            value.and_then(Json::as_str).is_some_and(|s| pattern.is_match(s))
        }
        "$not" => !field_matches(value, argument),
        "$exists" => value.is_some() == argument.as_bool().unwrap(),
        "$elemMatch" => value
            .and_then(Json::as_array)
            .is_some_and(|items| items.iter().any(|item| matches_document(item, argument))),
        other => panic!("unsupported operator {other}"),
    }
}

fn number(json: &Json) -> Option<f64> {
    match json {
        Json::Number(n) => n.as_f64(),
        Json::Object(map) => map.get("$numberDecimal")?.as_str()?.parse().ok(),
        _ => None,
    }
}

/// `$date`, `$uuid` and other single-key wrappers compare by their text.
fn wrapped(json: &Json) -> Option<(&str, &str)> {
    let map = json.as_object()?;
    let (key, value) = map.iter().next()?;
    Some((key.as_str(), value.as_str()?))
}

fn order(value: Option<&Json>, argument: &Json) -> Option<Ordering> {
    let value = value?;
    match (value, argument) {
        (Json::String(a), Json::String(b)) => Some(a.cmp(b)),
        (Json::Bool(a), Json::Bool(b)) => Some(a.cmp(b)),
        _ => {
            if let (Some(a), Some(b)) = (number(value), number(argument)) {
                return a.partial_cmp(&b);
            }
            match (wrapped(value), wrapped(argument)) {
                (Some((ka, a)), Some((kb, b))) if ka == kb => Some(a.cmp(b)),
                _ => None,
            }
        }
    }
}

fn equals(value: Option<&Json>, argument: &Json) -> bool {
    match value {
        None | Some(Json::Null) => argument.is_null(),
        Some(_) if argument.is_null() => false,
        Some(_) => order(value, argument) == Some(Ordering::Equal),
    }
}
