use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use super::validate::{ValidationReport, Validator};
use super::{is_identifier, Constraint, DefinitionError, Primitive, TypeDef, UnknownTypeError};

/// What a type name resolves to.
#[derive(Debug, Clone)]
pub enum Resolved {
    Primitive(Primitive),
    Def(Arc<TypeDef>),
}

/// Named type definitions. Populated during setup, then shared read-only
/// by reference with validators and runs.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    defs: HashMap<String, Arc<TypeDef>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record type. Redefining a name replaces the old entry.
    pub fn define<I, K>(&mut self, name: &str, fields: I) -> Result<(), DefinitionError>
    where
        I: IntoIterator<Item = (K, Constraint)>,
        K: Into<String>,
    {
        self.insert(name, TypeDef::record(fields))
    }

    pub fn define_union(&mut self, name: &str, a: &str, b: &str) -> Result<(), DefinitionError> {
        for branch in [a, b] {
            if !is_identifier(branch) {
                return Err(DefinitionError::new(name, format!("bad branch name `{branch}`")));
            }
            if branch == name {
                return Err(DefinitionError::new(name, "union cannot contain itself"));
            }
        }
        self.insert(name, TypeDef::Union(a.to_string(), b.to_string()))
    }

    pub fn define_alias(&mut self, name: &str, constraint: Constraint) -> Result<(), DefinitionError> {
        if constraint.references().contains(&name) {
            return Err(DefinitionError::new(name, "alias cannot refer to itself"));
        }
        self.insert(name, TypeDef::Alias(constraint))
    }

    /// Registers an already-built definition (e.g. a generated schema).
    pub fn insert(&mut self, name: &str, def: TypeDef) -> Result<(), DefinitionError> {
        if !is_identifier(name) {
            return Err(DefinitionError::new(name, "type names must be identifiers"));
        }
        if Primitive::from_name(name).is_some() {
            return Err(DefinitionError::new(name, "name is reserved for a built-in kind"));
        }
        self.defs.insert(name.to_string(), Arc::new(def));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<TypeDef>> {
        self.defs.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        Primitive::from_name(name).is_some() || self.defs.contains_key(name)
    }

    pub fn resolve(&self, name: &str) -> Result<Resolved, UnknownTypeError> {
        if let Some(kind) = Primitive::from_name(name) {
            return Ok(Resolved::Primitive(kind));
        }
        self.defs
            .get(name)
            .cloned()
            .map(Resolved::Def)
            .ok_or_else(|| UnknownTypeError {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.defs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn validate(&self, name: &str, value: &Value) -> Result<ValidationReport, UnknownTypeError> {
        Validator::new(self).validate(name, value)
    }

    /// Confirms every reference resolves and no union loops back into itself
    /// through union or alias links alone.
    pub fn check(&self) -> anyhow::Result<()> {
        for name in self.names() {
            let Some(def) = self.get(&name) else { continue };
            for reference in def.references() {
                if !self.contains(reference) {
                    return Err(UnknownTypeError {
                        name: reference.to_string(),
                    }
                    .into());
                }
            }
            let mut seen = HashSet::new();
            if self.loops_back(&name, &name, &mut seen) {
                return Err(DefinitionError::new(&name, "union or alias refers back to itself").into());
            }
        }
        Ok(())
    }

    fn loops_back(&self, origin: &str, current: &str, seen: &mut HashSet<String>) -> bool {
        let Some(def) = self.get(current) else { return false };
        let next: Vec<&str> = match def.as_ref() {
            TypeDef::Union(a, b) => vec![a.as_str(), b.as_str()],
            TypeDef::Alias(constraint) => constraint.references(),
            TypeDef::Record(_) => return false,
        };
        for name in next {
            if name == origin {
                return true;
            }
            if seen.insert(name.to_string()) && self.loops_back(origin, name, seen) {
                return true;
            }
        }
        false
    }
}
