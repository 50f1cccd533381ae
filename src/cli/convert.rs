//! JSON -> Record conversion guided by entity metadata

use serde_json::Value as Json;

use super::CliError;
use crate::{
    model::{EntityType, PropertyType},
    value::{EnumValue, Primitive, Record, Value},
};

fn invalid(entity: &EntityType, property: &str, json: &Json) -> CliError {
    CliError::Record(format!("{}.{property}: unexpected value {json}", entity.name))
}

/// Converts one JSON object into a record of `entity`.
///
/// Keys are property names; values use the OData JSON format. Unknown keys
/// are rejected, missing properties read as null.
pub fn json_to_record(json: &Json, entity: &EntityType) -> Result<Record, CliError> {
    let object = json
        .as_object()
        .ok_or_else(|| CliError::Record(format!("{}: expected an object, found {json}", entity.name)))?;

    let mut record = Record::new();
    for (name, value) in object {
        let property = entity
            .find(name)
            .ok_or_else(|| CliError::Record(format!("{}: unknown property '{name}'", entity.name)))?;

        let converted = match &property.ty {
            PropertyType::Primitive(kind) => Value::Primitive(
                Primitive::from_json(*kind, value).ok_or_else(|| invalid(entity, name, value))?,
            ),
            PropertyType::Enum(ty) => {
                let primitive = match value {
                    Json::Null => Primitive::Null,
                    Json::String(s) => {
                        let names: Vec<&str> = s.split(',').map(str::trim).collect();
                        let members = ty.normalize(&names).ok_or_else(|| invalid(entity, name, value))?;
                        Primitive::Enum(EnumValue {
                            type_name: ty.name.clone(),
                            members,
                        })
                    }
                    _ => return Err(invalid(entity, name, value)),
                };
                Value::Primitive(primitive)
            }
            PropertyType::Collection { target, .. } => match value {
                Json::Null => Value::Collection(Vec::new()),
                Json::Array(_) => Value::Collection(json_to_records(value, target)?),
                _ => return Err(invalid(entity, name, value)),
            },
        };
        record.insert(property.source.clone(), converted);
    }
    Ok(record)
}

/// Converts a JSON array of objects, or a single object, into records.
pub fn json_to_records(json: &Json, entity: &EntityType) -> Result<Vec<Record>, CliError> {
    match json {
        Json::Array(items) => items.iter().map(|item| json_to_record(item, entity)).collect(),
        single => Ok(vec![json_to_record(single, entity)?]),
    }
}
