use serde_json::Value;

/// Built-in kinds every registry understands without a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Any,
    String,
    Integer,
    Number,
    Boolean,
    None,
    Id,
    Email,
    Object,
    Array,
}

const ALL: [Primitive; 10] = [
    Primitive::Any,
    Primitive::String,
    Primitive::Integer,
    Primitive::Number,
    Primitive::Boolean,
    Primitive::None,
    Primitive::Id,
    Primitive::Email,
    Primitive::Object,
    Primitive::Array,
];

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Any => "Any",
            Primitive::String => "String",
            Primitive::Integer => "Integer",
            Primitive::Number => "Number",
            Primitive::Boolean => "Boolean",
            Primitive::None => "None",
            Primitive::Id => "ID",
            Primitive::Email => "Email",
            Primitive::Object => "Object",
            Primitive::Array => "Array",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ALL.iter().copied().find(|kind| kind.name() == name)
    }

    pub fn matches(self, value: &Value) -> bool {
        match self {
            Primitive::Any => true,
            Primitive::String => value.is_string(),
            Primitive::Integer => is_integer(value),
            Primitive::Number => value.is_number(),
            Primitive::Boolean => value.is_boolean(),
            Primitive::None => value.is_null(),
            Primitive::Id => value.as_str().is_some_and(|s| !s.trim().is_empty()),
            Primitive::Email => value.as_str().is_some_and(is_email),
            Primitive::Object => value.is_object(),
            Primitive::Array => value.is_array(),
        }
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => true,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0),
        _ => false,
    }
}

fn is_email(text: &str) -> bool {
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || text.chars().any(char::is_whitespace) {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
        })
}

/// Runtime kind of a decoded JSON value, as reported in type mismatches.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) if is_integer(value) => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_round_trip() {
        for kind in ALL {
            assert_eq!(Primitive::from_name(kind.name()), Some(kind));
        }
        assert_eq!(Primitive::from_name("Session"), None);
    }

    #[test]
    fn integer_accepts_whole_floats_only() {
        assert!(Primitive::Integer.matches(&json!(3)));
        assert!(Primitive::Integer.matches(&json!(-3)));
        assert!(Primitive::Integer.matches(&json!(4.0)));
        assert!(!Primitive::Integer.matches(&json!(4.5)));
        assert!(!Primitive::Integer.matches(&json!("4")));
    }

    #[test]
    fn email_shape() {
        assert!(Primitive::Email.matches(&json!("cris7fe@gmail.com")));
        assert!(!Primitive::Email.matches(&json!("no-at-sign.com")));
        assert!(!Primitive::Email.matches(&json!("a@localhost")));
        assert!(!Primitive::Email.matches(&json!("a b@x.io")));
        assert!(!Primitive::Email.matches(&json!("a@@x.io")));
    }

    #[test]
    fn id_and_none() {
        assert!(Primitive::Id.matches(&json!("abc")));
        assert!(!Primitive::Id.matches(&json!("")));
        assert!(Primitive::None.matches(&Value::Null));
        assert!(!Primitive::None.matches(&json!(0)));
        assert_eq!(kind_of(&json!(1.5)), "number");
        assert_eq!(kind_of(&json!(true)), "boolean");
    }
}
