//! Entity metadata read from a JSON schema file
//!
//! ```text
//! {
//!   "enums": [{ "name": "Sales.Color", "members": ["Red", "Green"], "flags": false }],
//!   "entities": [
//!     { "name": "Item", "source": "items",
//!       "properties": [{ "name": "qty", "type": "Edm.Int32" }] },
//!     { "name": "Order", "source": "orders",
//!       "properties": [
//!         { "name": "color", "type": "Sales.Color" },
//!         { "name": "items", "collection": "Item", "source_key": "id", "target_key": "order_id" }
//!       ] }
//!   ],
//!   "root": "Order"
//! }
//! ```

use std::{collections::HashMap, sync::Arc};

use serde::Deserialize;

use super::CliError;
use crate::{
    model::{EntityType, EnumType, Property},
    value::PrimitiveKind,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaFile {
    #[serde(default)]
    enums: Vec<EnumDef>,
    entities: Vec<EntityDef>,
    root: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnumDef {
    name: String,
    members: Vec<String>,
    #[serde(default)]
    flags: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntityDef {
    name: String,
    /// Table, collection or record set; the entity name if absent
    source: Option<String>,
    properties: Vec<PropertyDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PropertyDef {
    name: String,
    #[serde(rename = "type")]
    ty: Option<String>,
    source: Option<String>,
    #[serde(default = "nullable_default")]
    nullable: bool,
    /// Target entity of a collection navigation property
    collection: Option<String>,
    source_key: Option<String>,
    target_key: Option<String>,
}

fn nullable_default() -> bool {
    true
}

/// Resolved metadata of a schema file.
#[derive(Debug)]
pub struct Schema {
    entities: HashMap<String, Arc<EntityType>>,
    root: Arc<EntityType>,
}

struct Builder<'a> {
    defs: HashMap<&'a str, &'a EntityDef>,
    enums: HashMap<String, Arc<EnumType>>,
    built: HashMap<String, Arc<EntityType>>,
    /// Entities whose construction is in progress
    building: Vec<String>,
}

impl Builder<'_> {
    fn entity(&mut self, name: &str) -> Result<Arc<EntityType>, CliError> {
        if let Some(entity) = self.built.get(name) {
            return Ok(Arc::clone(entity));
        }
        if self.building.iter().any(|b| b == name) {
            return Err(CliError::Schema(format!("navigation cycle through '{name}'")));
        }
        let def = *self
            .defs
            .get(name)
            .ok_or_else(|| CliError::Schema(format!("unknown entity '{name}'")))?;

        self.building.push(name.to_string());
        let mut entity = EntityType::new(&def.name, def.source.as_deref().unwrap_or(&def.name));
        for property in &def.properties {
            entity = entity.property(self.property(&def.name, property)?);
        }
        self.building.pop();

        let entity = Arc::new(entity);
        self.built.insert(name.to_string(), Arc::clone(&entity));
        Ok(entity)
    }

    fn property(&mut self, owner: &str, def: &PropertyDef) -> Result<Property, CliError> {
        let mut property = match (&def.ty, &def.collection) {
            (Some(ty), None) => {
                if let Some(kind) = PrimitiveKind::from_edm_name(ty) {
                    Property::primitive(&def.name, kind)
                } else if let Some(enumeration) = self.enums.get(ty) {
                    Property::enumeration(&def.name, Arc::clone(enumeration))
                } else {
                    return Err(CliError::Schema(format!("{owner}.{}: unknown type '{ty}'", def.name)));
                }
            }
            (None, Some(target)) => {
                let (Some(source_key), Some(target_key)) = (&def.source_key, &def.target_key) else {
                    return Err(CliError::Schema(format!(
                        "{owner}.{}: collections need source_key and target_key",
                        def.name
                    )));
                };
                let target = self.entity(target)?;
                Property::collection(&def.name, target, source_key, target_key)
            }
            _ => {
                return Err(CliError::Schema(format!(
                    "{owner}.{}: give exactly one of type and collection",
                    def.name
                )));
            }
        };
        if let Some(source) = &def.source {
            property = property.with_source(source);
        }
        if !def.nullable {
            property = property.not_null();
        }
        Ok(property)
    }
}

impl Schema {
    pub fn from_json(text: &str) -> Result<Self, CliError> {
        let file: SchemaFile = serde_json::from_str(text)?;

        let enums = file
            .enums
            .iter()
            .map(|def| {
                let enumeration = EnumType {
                    name: def.name.clone(),
                    members: def.members.clone(),
                    is_flags: def.flags,
                };
                (def.name.clone(), Arc::new(enumeration))
            })
            .collect();

        let mut builder = Builder {
            defs: file.entities.iter().map(|def| (def.name.as_str(), def)).collect(),
            enums,
            built: HashMap::new(),
            building: Vec::new(),
        };
        for def in &file.entities {
            builder.entity(&def.name)?;
        }
        let root = builder.entity(&file.root)?;

        Ok(Schema {
            entities: builder.built,
            root,
        })
    }

    pub fn root(&self) -> &Arc<EntityType> {
        &self.root
    }

    pub fn entity(&self, name: &str) -> Option<&Arc<EntityType>> {
        self.entities.get(name)
    }
}
