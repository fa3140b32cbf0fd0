use std::fmt;

use serde::Serialize;
use serde_json::Value;

use super::primitive::kind_of;
use super::registry::{Resolved, TypeRegistry};
use super::{Constraint, Primitive, TypeDef, UnknownTypeError};

/// One structural problem found in a value. Paths are rooted at `$`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValidationError {
    MissingField {
        path: String,
        field: String,
    },
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    /// Error produced while trying one side of a union that matched neither side.
    UnionBranch {
        path: String,
        union: String,
        branch: String,
        error: Box<ValidationError>,
    },
}

impl ValidationError {
    pub fn path(&self) -> &str {
        match self {
            ValidationError::MissingField { path, .. }
            | ValidationError::TypeMismatch { path, .. }
            | ValidationError::UnionBranch { path, .. } => path,
        }
    }

    pub fn is_missing_field(&self) -> bool {
        matches!(self, ValidationError::MissingField { .. })
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingField { path, .. } => write!(f, "{path}: missing required field"),
            ValidationError::TypeMismatch {
                path,
                expected,
                actual,
            } => write!(f, "{path}: expected {expected}, got {actual}"),
            ValidationError::UnionBranch {
                union,
                branch,
                error,
                ..
            } => write!(f, "[{union} via {branch}] {error}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Depth-first structural checker over registry definitions.
///
/// Records are open: keys present in the value but not declared by the
/// record are ignored, so servers can add fields without breaking clients.
pub struct Validator<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> Validator<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    /// Data problems land in the report; only an unresolvable type name is an `Err`.
    pub fn validate(&self, name: &str, value: &Value) -> Result<ValidationReport, UnknownTypeError> {
        let mut errors = Vec::new();
        self.check_named(name, value, "$", &mut Vec::new(), &mut errors)?;
        Ok(ValidationReport::from_errors(errors))
    }

    /// Validates against a definition that need not be registered.
    pub fn validate_def(
        &self,
        label: &str,
        def: &TypeDef,
        value: &Value,
    ) -> Result<ValidationReport, UnknownTypeError> {
        let mut errors = Vec::new();
        self.check_def(label, def, value, "$", &mut Vec::new(), &mut errors)?;
        Ok(ValidationReport::from_errors(errors))
    }

    fn check_named(
        &self,
        name: &str,
        value: &Value,
        path: &str,
        chain: &mut Vec<String>,
        errors: &mut Vec<ValidationError>,
    ) -> Result<(), UnknownTypeError> {
        match self.registry.resolve(name)? {
            Resolved::Primitive(kind) => {
                check_primitive(kind, value, path, errors);
                Ok(())
            }
            Resolved::Def(def) => {
                // unions and aliases re-examine the same value; a repeat means a loop
                if chain.iter().any(|seen| seen == name) {
                    errors.push(ValidationError::TypeMismatch {
                        path: path.to_string(),
                        expected: format!("{name} (cyclic definition)"),
                        actual: kind_of(value).to_string(),
                    });
                    return Ok(());
                }
                chain.push(name.to_string());
                let result = self.check_def(name, &def, value, path, chain, errors);
                chain.pop();
                result
            }
        }
    }

    fn check_def(
        &self,
        label: &str,
        def: &TypeDef,
        value: &Value,
        path: &str,
        chain: &mut Vec<String>,
        errors: &mut Vec<ValidationError>,
    ) -> Result<(), UnknownTypeError> {
        match def {
            TypeDef::Record(fields) => {
                let Some(map) = value.as_object() else {
                    errors.push(ValidationError::TypeMismatch {
                        path: path.to_string(),
                        expected: label.to_string(),
                        actual: kind_of(value).to_string(),
                    });
                    return Ok(());
                };
                for (field, constraint) in fields {
                    let field_path = format!("{path}.{field}");
                    match map.get(field) {
                        Some(present) => {
                            self.check_constraint(constraint, present, &field_path, &mut Vec::new(), errors)?
                        }
                        None if self.may_be_absent(constraint) => {}
                        None => errors.push(ValidationError::MissingField {
                            path: field_path,
                            field: field.clone(),
                        }),
                    }
                }
                Ok(())
            }
            TypeDef::Union(a, b) => self.check_either(label, a, b, value, path, chain, errors),
            TypeDef::Alias(constraint) => self.check_constraint(constraint, value, path, chain, errors),
        }
    }

    fn check_constraint(
        &self,
        constraint: &Constraint,
        value: &Value,
        path: &str,
        chain: &mut Vec<String>,
        errors: &mut Vec<ValidationError>,
    ) -> Result<(), UnknownTypeError> {
        match constraint {
            Constraint::Primitive(kind) => {
                check_primitive(*kind, value, path, errors);
                Ok(())
            }
            Constraint::Ref(name) => self.check_named(name, value, path, chain, errors),
            Constraint::Optional(_) if value.is_null() => Ok(()),
            Constraint::Optional(inner) => self.check_constraint(inner, value, path, chain, errors),
            Constraint::Either(a, b) => {
                let label = format!("{a}|{b}");
                self.check_either(&label, a, b, value, path, chain, errors)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_either(
        &self,
        label: &str,
        a: &str,
        b: &str,
        value: &Value,
        path: &str,
        chain: &mut Vec<String>,
        errors: &mut Vec<ValidationError>,
    ) -> Result<(), UnknownTypeError> {
        let mut left = Vec::new();
        self.check_named(a, value, path, chain, &mut left)?;
        if left.is_empty() {
            return Ok(());
        }
        let mut right = Vec::new();
        self.check_named(b, value, path, chain, &mut right)?;
        if right.is_empty() {
            return Ok(());
        }
        for (branch, branch_errors) in [(a, left), (b, right)] {
            for error in branch_errors {
                errors.push(ValidationError::UnionBranch {
                    path: path.to_string(),
                    union: label.to_string(),
                    branch: branch.to_string(),
                    error: Box::new(error),
                });
            }
        }
        Ok(())
    }

    /// Optional fields, directly or through aliases of optional constraints.
    fn may_be_absent(&self, constraint: &Constraint) -> bool {
        let mut current = constraint.clone();
        for _ in 0..16 {
            match current {
                Constraint::Optional(_) => return true,
                Constraint::Ref(name) => {
                    current = match self.registry.get(&name).as_deref() {
                        Some(TypeDef::Alias(inner)) => inner.clone(),
                        _ => return false,
                    };
                }
                _ => return false,
            }
        }
        false
    }
}

fn check_primitive(kind: Primitive, value: &Value, path: &str, errors: &mut Vec<ValidationError>) {
    if !kind.matches(value) {
        errors.push(ValidationError::TypeMismatch {
            path: path.to_string(),
            expected: kind.name().to_string(),
            actual: kind_of(value).to_string(),
        });
    }
}
