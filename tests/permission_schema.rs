use anyhow::Result;
use contract_kernel_rs::permissions::{validate_permission, PERMISSION_TYPE};
use contract_kernel_rs::types::ValidationError;
use contract_kernel_rs::{generate_permission_schema, register_permission_schema, TypeRegistry};
use serde_json::json;

#[test]
fn generated_schema_checks_every_permission() -> Result<()> {
    let mut registry = TypeRegistry::new();
    register_permission_schema(&mut registry, &["read", "write"])?;

    let full = json!({ "_id": "x", "read": true, "write": false });
    assert!(validate_permission(&registry, &full)?.valid);

    let partial = json!({ "_id": "x", "read": true });
    let report = validate_permission(&registry, &partial)?;
    assert!(!report.valid);
    assert_eq!(
        report.errors,
        vec![ValidationError::MissingField {
            path: "$.write".into(),
            field: "write".into(),
        }]
    );

    let wrong_kind = json!({ "_id": "x", "read": "yes", "write": false });
    assert_eq!(validate_permission(&registry, &wrong_kind)?.errors.len(), 1);
    Ok(())
}

#[test]
fn duplicate_names_are_rejected() {
    let err = generate_permission_schema(&["read", "read"]).unwrap_err();
    assert_eq!(err.name, PERMISSION_TYPE);
    assert!(err.reason.contains("duplicate permission name `read`"));
}

#[test]
fn regeneration_picks_up_new_names() -> Result<()> {
    let mut registry = TypeRegistry::new();
    register_permission_schema(&mut registry, &["read"])?;
    let value = json!({ "_id": "x", "read": true });
    assert!(validate_permission(&registry, &value)?.valid);

    let names = vec!["read".to_string(), "admin".to_string()];
    register_permission_schema(&mut registry, names.as_slice())?;
    assert!(!validate_permission(&registry, &value)?.valid);
    Ok(())
}

#[test]
fn failed_generation_leaves_previous_schema() -> Result<()> {
    let mut registry = TypeRegistry::new();
    register_permission_schema(&mut registry, &["read"])?;
    assert!(register_permission_schema(&mut registry, &["a", "a"]).is_err());
    let value = json!({ "_id": "x", "read": true });
    assert!(validate_permission(&registry, &value)?.valid);
    Ok(())
}
