use std::collections::BTreeMap;

use serde_json::Value;

use crate::types::{
    Constraint, DefinitionError, Primitive, TypeDef, TypeRegistry, UnknownTypeError,
    ValidationReport,
};

pub const PERMISSION_TYPE: &str = "Permission";
const ID_FIELD: &str = "_id";

/// Builds the permission record: a required `_id` plus one required boolean
/// per permission name. Duplicate names are rejected, never merged.
pub fn generate_permission_schema<S: AsRef<str>>(names: &[S]) -> Result<TypeDef, DefinitionError> {
    let mut fields = BTreeMap::new();
    fields.insert(ID_FIELD.to_string(), Constraint::Primitive(Primitive::Id));
    for name in names {
        let name = name.as_ref();
        if name.trim().is_empty() {
            return Err(DefinitionError::new(PERMISSION_TYPE, "permission names cannot be blank"));
        }
        if name == ID_FIELD {
            return Err(DefinitionError::new(
                PERMISSION_TYPE,
                format!("`{ID_FIELD}` is reserved for the record identifier"),
            ));
        }
        if fields
            .insert(name.to_string(), Constraint::Primitive(Primitive::Boolean))
            .is_some()
        {
            return Err(DefinitionError::new(
                PERMISSION_TYPE,
                format!("duplicate permission name `{name}`"),
            ));
        }
    }
    Ok(TypeDef::Record(fields))
}

/// Generates the schema and registers it as `Permission`. Call again to pick
/// up a changed name list; nothing tracks the source.
pub fn register_permission_schema<S: AsRef<str>>(
    registry: &mut TypeRegistry,
    names: &[S],
) -> Result<(), DefinitionError> {
    let schema = generate_permission_schema(names)?;
    registry.insert(PERMISSION_TYPE, schema)
}

pub fn validate_permission(
    registry: &TypeRegistry,
    permission: &Value,
) -> Result<ValidationReport, UnknownTypeError> {
    registry.validate(PERMISSION_TYPE, permission)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn one_boolean_per_name() {
        let schema = generate_permission_schema(&["read", "write"]).unwrap();
        let TypeDef::Record(fields) = schema else {
            panic!("expected a record");
        };
        assert_eq!(fields.len(), 3);
        assert_eq!(fields["read"], Constraint::Primitive(Primitive::Boolean));
        assert_eq!(fields["_id"], Constraint::Primitive(Primitive::Id));
    }

    #[test]
    fn rejects_duplicates_blank_and_reserved() {
        assert!(generate_permission_schema(&["read", "read"]).is_err());
        assert!(generate_permission_schema(&["read", " "]).is_err());
        assert!(generate_permission_schema(&["_id"]).is_err());
    }

    #[test]
    fn empty_list_still_needs_an_id() {
        let mut registry = TypeRegistry::new();
        register_permission_schema::<&str>(&mut registry, &[]).unwrap();
        assert!(validate_permission(&registry, &json!({ "_id": "p" })).unwrap().valid);
        assert!(!validate_permission(&registry, &json!({})).unwrap().valid);
    }
}
