use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{RequestSpec, TestSpec};
use crate::permissions::register_permission_schema;
use crate::types::{Constraint, TypeRegistry};

/// Declarative test plan, read from YAML or JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanFile {
    #[serde(default)]
    pub types: BTreeMap<String, TypeEntry>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    pub steps: Vec<StepEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TypeEntry {
    Union(UnionEntry),
    Record(RecordEntry),
    Alias(String),
}

/// `{ union: [A, B] }`; any other key makes the entry invalid.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnionEntry {
    pub union: [String; 2],
}

/// `{ fields: { name: constraint, .. } }`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordEntry {
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepEntry {
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(rename = "type")]
    pub expected_type: String,
}

fn default_method() -> String {
    "POST".to_string()
}

pub fn load_plan(path: &Path) -> Result<PlanFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read plan file: {}", path.display()))?;
    parse_plan(&content, path)
}

fn parse_plan(content: &str, path: &Path) -> Result<PlanFile> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(content)
            .with_context(|| format!("invalid JSON plan: {}", path.display()))
    } else {
        serde_yaml::from_str(content)
            .with_context(|| format!("invalid YAML plan: {}", path.display()))
    }
}

impl PlanFile {
    /// Registers the plan's types and, when listed, its permission schema.
    pub fn install_types(&self, registry: &mut TypeRegistry) -> Result<()> {
        for (name, entry) in &self.types {
            match entry {
                TypeEntry::Union(UnionEntry { union: [a, b] }) => {
                    registry.define_union(name, a, b)?
                }
                TypeEntry::Record(RecordEntry { fields }) => {
                    let mut parsed = Vec::with_capacity(fields.len());
                    for (field, text) in fields {
                        let constraint: Constraint = text
                            .parse()
                            .with_context(|| format!("field `{field}` of type `{name}`"))?;
                        parsed.push((field.clone(), constraint));
                    }
                    registry.define(name, parsed)?;
                }
                TypeEntry::Alias(text) => {
                    let constraint: Constraint = text
                        .parse()
                        .with_context(|| format!("alias `{name}`"))?;
                    registry.define_alias(name, constraint)?;
                }
            }
        }
        if let Some(names) = &self.permissions {
            register_permission_schema(registry, names.as_slice())?;
        }
        Ok(())
    }

    /// Steps with `${path}` placeholders become derived specs that read the
    /// previous response; the rest are literal.
    pub fn into_specs(self) -> Vec<TestSpec> {
        self.steps.into_iter().map(StepEntry::into_spec).collect()
    }
}

impl StepEntry {
    pub fn into_spec(self) -> TestSpec {
        if self.has_placeholders() {
            TestSpec::derived(move |previous| self.render(previous))
        } else {
            TestSpec::Literal(self.to_request(self.endpoint.clone(), self.headers.clone(), self.body.clone()))
        }
    }

    fn has_placeholders(&self) -> bool {
        contains_placeholder(&self.endpoint)
            || self.headers.values().any(|value| contains_placeholder(value))
            || self.body.as_ref().is_some_and(value_has_placeholder)
    }

    fn render(&self, previous: Option<&Value>) -> Result<RequestSpec> {
        let source = previous.ok_or_else(|| anyhow!("step needs a previous response but none is available"))?;
        let endpoint = substitute_text(&self.endpoint, source)?;
        let mut headers = BTreeMap::new();
        for (name, value) in &self.headers {
            headers.insert(name.clone(), substitute_text(value, source)?);
        }
        let body = self
            .body
            .as_ref()
            .map(|body| substitute_value(body, source))
            .transpose()?;
        Ok(self.to_request(endpoint, headers, body))
    }

    fn to_request(
        &self,
        endpoint: String,
        headers: BTreeMap<String, String>,
        body: Option<Value>,
    ) -> RequestSpec {
        RequestSpec {
            endpoint,
            method: self.method.to_uppercase(),
            headers,
            body,
            expected_type: self.expected_type.clone(),
        }
    }
}

fn contains_placeholder(text: &str) -> bool {
    text.find("${")
        .is_some_and(|start| text[start..].contains('}'))
}

fn value_has_placeholder(value: &Value) -> bool {
    match value {
        Value::String(text) => contains_placeholder(text),
        Value::Array(items) => items.iter().any(value_has_placeholder),
        Value::Object(map) => map.values().any(value_has_placeholder),
        _ => false,
    }
}

fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for part in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(part)?,
            Value::Array(arr) => {
                let idx: usize = part.parse().ok()?;
                current = arr.get(idx)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

fn lookup<'a>(source: &'a Value, path: &str) -> Result<&'a Value> {
    get_path(source, path).ok_or_else(|| anyhow!("previous response has no value at `{path}`"))
}

/// A string that is exactly one placeholder yields the referenced value itself.
fn whole_placeholder(text: &str) -> Option<&str> {
    let inner = text.strip_prefix("${")?.strip_suffix('}')?;
    if inner.contains("${") || inner.contains('}') {
        return None;
    }
    Some(inner.trim())
}

fn substitute_text(text: &str, source: &Value) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let path = rest[start + 2..start + 2 + len].trim();
        match lookup(source, path)? {
            Value::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
        rest = &rest[start + 3 + len..];
    }
    out.push_str(rest);
    Ok(out)
}

fn substitute_value(value: &Value, source: &Value) -> Result<Value> {
    match value {
        Value::String(text) => match whole_placeholder(text) {
            Some(path) => Ok(lookup(source, path)?.clone()),
            None => Ok(Value::String(substitute_text(text, source)?)),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| substitute_value(item, source))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), substitute_value(item, source)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}
