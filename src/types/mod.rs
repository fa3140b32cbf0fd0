pub mod primitive;
pub mod registry;
pub mod validate;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub use primitive::Primitive;
pub use registry::TypeRegistry;
pub use validate::{ValidationError, ValidationReport, Validator};

/// Raised when a schema definition is malformed. Always a setup problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionError {
    pub name: String,
    pub reason: String,
}

impl DefinitionError {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid definition `{}`: {}", self.name, self.reason)
    }
}

impl std::error::Error for DefinitionError {}

/// Raised when a schema refers to a name nothing defines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTypeError {
    pub name: String,
}

impl fmt::Display for UnknownTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown type: {}", self.name)
    }
}

impl std::error::Error for UnknownTypeError {}

/// Constraint placed on a single record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Primitive(Primitive),
    /// Named type, resolved at validation time so forward declarations work.
    Ref(String),
    /// Field may be absent (or null); present values must satisfy the inner constraint.
    Optional(Box<Constraint>),
    /// Value must satisfy either of two named types.
    Either(String, String),
}

impl Constraint {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        match Primitive::from_name(&name) {
            Some(kind) => Constraint::Primitive(kind),
            None => Constraint::Ref(name),
        }
    }

    pub fn optional(inner: Constraint) -> Self {
        match inner {
            already @ Constraint::Optional(_) => already,
            other => Constraint::Optional(Box::new(other)),
        }
    }

    pub fn either(a: impl Into<String>, b: impl Into<String>) -> Self {
        Constraint::Either(a.into(), b.into())
    }

    pub(crate) fn references(&self) -> Vec<&str> {
        match self {
            Constraint::Primitive(_) => Vec::new(),
            Constraint::Ref(name) => vec![name.as_str()],
            Constraint::Optional(inner) => inner.references(),
            Constraint::Either(a, b) => vec![a.as_str(), b.as_str()],
        }
    }
}

/// `optional(constraint)` as a free function, for record literals.
pub fn optional(inner: Constraint) -> Constraint {
    Constraint::optional(inner)
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Primitive(kind) => write!(f, "{}", kind.name()),
            Constraint::Ref(name) => write!(f, "{name}"),
            Constraint::Optional(inner) => write!(f, "?{inner}"),
            Constraint::Either(a, b) => write!(f, "{a}|{b}"),
        }
    }
}

/// Text form: `Name`, `?Name`, `A|B`, `?A|B`.
impl FromStr for Constraint {
    type Err = DefinitionError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        let (optional, body) = match trimmed.strip_prefix('?') {
            Some(rest) => (true, rest.trim()),
            None => (false, trimmed),
        };
        let parsed = match body.split_once('|') {
            Some((a, b)) => {
                let (a, b) = (a.trim(), b.trim());
                if !is_identifier(a) || !is_identifier(b) || b.contains('|') {
                    return Err(DefinitionError::new(text, "union needs exactly two type names"));
                }
                Constraint::either(a, b)
            }
            None => {
                if !is_identifier(body) {
                    return Err(DefinitionError::new(text, "not a type name"));
                }
                Constraint::named(body)
            }
        };
        Ok(if optional {
            Constraint::optional(parsed)
        } else {
            parsed
        })
    }
}

/// A named schema entry. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDef {
    Record(BTreeMap<String, Constraint>),
    Union(String, String),
    Alias(Constraint),
}

impl TypeDef {
    pub fn record<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Constraint)>,
        K: Into<String>,
    {
        TypeDef::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub(crate) fn references(&self) -> Vec<&str> {
        match self {
            TypeDef::Record(fields) => fields.values().flat_map(Constraint::references).collect(),
            TypeDef::Union(a, b) => vec![a.as_str(), b.as_str()],
            TypeDef::Alias(constraint) => constraint.references(),
        }
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
