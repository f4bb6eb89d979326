//! Schema Registry.
//!
//! Compiles one JSON Schema per collection at construction time and exposes
//! a `validate(collection, item)` operation. Schemas declare the custom
//! `objectid` format (an opaque identifier, see [`crate::ids::ObjectId`])
//! and are strict: `additionalProperties: false`.

use std::collections::HashMap;

use jsonschema::Validator;
use serde_json::{Value, json};

use crate::{document::Document, error::ValidationError};

/// One compiled validator per collection name.
pub struct SchemaRegistry {
    validators: HashMap<&'static str, Validator>,
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("collections", &self.validators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SchemaRegistry {
    /// Builds the registry with the catalog's fixed set of built-in
    /// collection schemas.
    ///
    /// # Panics
    /// Panics if a built-in schema fails to compile - a malformed built-in
    /// schema is a programming error, not a runtime condition.
    #[must_use]
    pub fn new() -> Self {
        let mut validators = HashMap::new();
        for (collection, schema) in built_in_schemas() {
            let validator = compile(&schema).unwrap_or_else(|e| {
                panic!("built-in schema for collection `{collection}` failed to compile: {e}")
            });
            validators.insert(collection, validator);
        }
        Self { validators }
    }

    /// Validates `item` against the collection's declared schema.
    ///
    /// Returns `Ok(())` when valid, or a [`ValidationError`] carrying one
    /// message per schema violation when not. An unknown collection name is
    /// itself a validation failure rather than a panic, since it can arise
    /// from data the document store returns for a collection this process
    /// doesn't yet know about.
    pub fn validate(&self, collection: &str, item: &Document) -> Result<(), ValidationError> {
        let Some(validator) = self.validators.get(collection) else {
            return Err(ValidationError {
                collection: collection.to_string(),
                details: vec![format!("no schema registered for collection `{collection}`")],
                stack: Vec::new(),
            });
        };

        let instance = Value::Object(item.clone());
        let details: Vec<String> = validator
            .iter_errors(&instance)
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();

        if details.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                collection: collection.to_string(),
                details,
                stack: Vec::new(),
            })
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(schema: &Value) -> Result<Validator, jsonschema::ValidationError<'static>> {
    jsonschema::options()
        .with_format("objectid", |s: &str| s.parse::<uuid::Uuid>().is_ok())
        .build(schema)
}

/// Common envelope every entity schema extends: a required `_id` of format
/// `objectid` and a nullable `deleted` timestamp, with unknown fields
/// rejected.
fn entity_schema(extra_properties: Value, required: &[&str]) -> Value {
    let mut properties = json!({
        "_id": {"type": "string", "format": "objectid"},
        "deleted": {"type": ["string", "null"], "format": "date-time"},
    });
    let Value::Object(props) = &mut properties else {
        unreachable!()
    };
    if let Value::Object(extra) = extra_properties {
        props.extend(extra);
    }

    let mut required_fields: Vec<Value> = vec![json!("_id")];
    required_fields.extend(required.iter().map(|r| json!(*r)));

    json!({
        "type": "object",
        "properties": properties,
        "required": required_fields,
        "additionalProperties": false,
    })
}

fn built_in_schemas() -> Vec<(&'static str, Value)> {
    vec![
        (
            "systems",
            entity_schema(json!({"name": {"type": "string", "minLength": 1}}), &["name"]),
        ),
        (
            "accounts",
            entity_schema(
                json!({
                    "email": {"type": "string", "format": "email"},
                    "password_hash": {"type": ["string", "null"]},
                }),
                &["email"],
            ),
        ),
        (
            "roles",
            entity_schema(
                json!({
                    "account": {"type": "string", "format": "objectid"},
                    "system": {"type": "string", "format": "objectid"},
                    "role_name": {"type": "string", "minLength": 1},
                }),
                &["account", "system", "role_name"],
            ),
        ),
        (
            "buckets",
            entity_schema(
                json!({
                    "system": {"type": "string", "format": "objectid"},
                    "name": {"type": "string", "minLength": 1},
                    "tiering": {"type": "string", "format": "objectid"},
                }),
                &["system", "name", "tiering"],
            ),
        ),
        (
            "tiering_policies",
            entity_schema(
                json!({
                    "system": {"type": "string", "format": "objectid"},
                    "name": {"type": "string", "minLength": 1},
                    "tiers": {
                        "type": "array",
                        "items": {"type": "string", "format": "objectid"},
                    },
                }),
                &["system", "name", "tiers"],
            ),
        ),
        (
            "tiers",
            entity_schema(
                json!({
                    "system": {"type": "string", "format": "objectid"},
                    "name": {"type": "string", "minLength": 1},
                    "data_placement": {"type": "string", "enum": ["MIRROR", "SPREAD"]},
                    "pools": {
                        "type": "array",
                        "items": {"type": "string", "format": "objectid"},
                    },
                }),
                &["system", "name", "data_placement", "pools"],
            ),
        ),
        (
            "pools",
            entity_schema(
                json!({
                    "system": {"type": "string", "format": "objectid"},
                    "name": {"type": "string", "minLength": 1},
                    "nodes": {
                        "type": "array",
                        "items": {"type": "string", "format": "objectid"},
                    },
                }),
                &["system", "name"],
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn accepts_a_well_formed_system() {
        let registry = SchemaRegistry::new();
        let item = doc(json!({"_id": "01975f3e-0000-7000-8000-000000000001", "name": "prod"}));
        assert!(registry.validate("systems", &item).is_ok());
    }

    #[test]
    fn rejects_unknown_fields() {
        let registry = SchemaRegistry::new();
        let item = doc(json!({
            "_id": "01975f3e-0000-7000-8000-000000000001",
            "name": "prod",
            "unexpected_field": true,
        }));
        let err = registry.validate("systems", &item).unwrap_err();
        assert!(!err.details.is_empty());
    }

    #[test]
    fn rejects_an_id_that_is_not_an_objectid() {
        let registry = SchemaRegistry::new();
        let item = doc(json!({"_id": "not-a-uuid", "name": "prod"}));
        assert!(registry.validate("systems", &item).is_err());
    }

    #[test]
    fn rejects_an_unregistered_collection() {
        let registry = SchemaRegistry::new();
        let item = doc(json!({"_id": "01975f3e-0000-7000-8000-000000000001"}));
        assert!(registry.validate("not_a_real_collection", &item).is_err());
    }

    #[test]
    fn requires_declared_required_fields() {
        let registry = SchemaRegistry::new();
        let item = doc(json!({"_id": "01975f3e-0000-7000-8000-000000000001"}));
        assert!(registry.validate("systems", &item).is_err());
    }
}
