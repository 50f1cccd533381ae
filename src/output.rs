//! JSON rendering of compiled artifacts and records.
//!
//! This module turns what the facade returns into `serde_json` values, for
//! printing by the CLI or logging by an embedding service. All output is
//! deterministic: object keys are sorted.
//!
//! # Features
//!
//! - **SQL clauses** via [`clause_to_json()`] - `{"clause": ..., "params": [...]}`
//! - **Records** via [`record_to_json()`] - OData JSON values, related collections as arrays
//! - **Compact or pretty text** via [`to_json()`] and [`to_json_pretty()`]
//!
//! # Examples
//!
//! ```
//! use odata_expr::{JsonOptions, Primitive, Record};
//! use odata_expr::output::{record_to_json, to_json};
//!
//! let record = Record::new()
//!     .with("name", Primitive::String("Alice".to_string()))
//!     .with("age", Primitive::Int32(30));
//!
//! let json = record_to_json(&record, JsonOptions::default());
//! assert_eq!(to_json(&json), r#"{"age":30,"name":"Alice"}"#);
//! ```

use serde_json::{Map, Value as Json, json};

use crate::{
    backend::SqlClause,
    codec::JsonOptions,
    query::{Compiled, Computed},
    value::{Record, Value},
};

pub fn clause_to_json(clause: &SqlClause) -> Json {
    let params: Vec<Json> = clause.params.iter().map(|p| p.to_json()).collect();
    json!({ "clause": clause.clause, "params": params })
}

pub fn record_to_json(record: &Record, options: JsonOptions) -> Json {
    let mut object = Map::new();
    for (key, value) in record.iter() {
        let value = match value {
            Value::Primitive(p) => p.to_json(options),
            Value::Collection(records) => {
                Json::Array(records.iter().map(|r| record_to_json(r, options)).collect())
            }
        };
        object.insert(key.clone(), value);
    }
    Json::Object(object)
}

/// Renders a compiled filter; an in-memory predicate is shown by the
/// `records` it selects.
pub fn compiled_to_json(compiled: &Compiled, records: &[Record], options: JsonOptions) -> Json {
    match compiled {
        Compiled::Sql(clause) => clause_to_json(clause),
        Compiled::Document(document) => document.clone(),
        Compiled::Memory(predicate) => Json::Array(
            predicate
                .filter(records)
                .into_iter()
                .map(|r| record_to_json(r, options))
                .collect(),
        ),
    }
}

/// Renders compiled compute items; an in-memory projection is shown applied
/// to `records`.
pub fn computed_to_json(computed: &Computed, records: &[Record], options: JsonOptions) -> Json {
    match computed {
        Computed::Sql(clause) => clause_to_json(clause),
        Computed::Document(projection) => projection.clone(),
        Computed::Memory(projection) => Json::Array(
            records
                .iter()
                .map(|r| record_to_json(&projection.apply(r), options))
                .collect(),
        ),
    }
}

/// Compact JSON text with no extra whitespace.
pub fn to_json(value: &Json) -> String {
    value.to_string()
}

/// JSON text with 2-space indentation, one element or member per line.
pub fn to_json_pretty(value: &Json) -> String {
    format!("{value:#}")
}
