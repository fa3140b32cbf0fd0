use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use super::{RequestSpec, TestSpec};
use crate::types::{optional, Constraint, DefinitionError, TypeRegistry};

pub const LOGIN_ENDPOINT: &str = "/json/action/login";
pub const LOGOUT_ENDPOINT: &str = "/json/action/logout";
pub const SIGNUP_ENDPOINT: &str = "/json/action/signup";

/// Registers the response shapes the application's JSON actions return.
pub fn register_contract_types(registry: &mut TypeRegistry) -> Result<(), DefinitionError> {
    registry.define("Session", [("_id", Constraint::named("ID"))])?;
    registry.define_alias("Username", Constraint::named("String"))?;
    registry.define_union("MaybeInteger", "Integer", "None")?;
    registry.define(
        "Err",
        [
            ("error", Constraint::named("String")),
            ("status", Constraint::named("MaybeInteger")),
        ],
    )?;
    registry.define(
        "WrappedSession",
        [
            ("id", optional(Constraint::named("String"))),
            ("session", Constraint::named("Session")),
        ],
    )?;
    registry.define_union("MaybeSession", "WrappedSession", "Err")?;
    registry.define(
        "SignupResponse",
        [
            ("email", Constraint::named("Email")),
            ("username", Constraint::named("Username")),
        ],
    )?;
    registry.define("WrappedSelection", [("selection", Constraint::named("Object"))])?;
    Ok(())
}

/// Reads `session._id` from a login-shaped response.
pub fn session_id(response: Option<&Value>) -> Result<String> {
    let response = response.ok_or_else(|| anyhow!("no previous response to read a session from"))?;
    response
        .get("session")
        .and_then(|session| session.get("_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("previous response has no session._id"))
}

/// Login, logout with the login's session, a failing login, then a signup.
pub fn default_plan() -> Vec<TestSpec> {
    vec![
        RequestSpec::new(LOGIN_ENDPOINT, "WrappedSession")
            .body(json!({ "username": "test9", "password": "abc123" }))
            .into(),
        TestSpec::derived(|previous| {
            let token = session_id(previous)?;
            Ok(RequestSpec::new(LOGOUT_ENDPOINT, "WrappedSession").bearer(&token))
        }),
        RequestSpec::new(LOGIN_ENDPOINT, "Err")
            .body(json!({ "username": "test10", "password": "abc123" }))
            .into(),
        RequestSpec::new(SIGNUP_ENDPOINT, "SignupResponse")
            .body(json!({
                "email": "cris7fe@gmail.com",
                "username": format!("test10{}", unique_suffix()),
                "password": "abc123"
            }))
            .into(),
    ]
}

/// Short base-36 tag so repeated signups do not collide.
fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos() as u64 ^ elapsed.as_secs())
        .unwrap_or_default();
    to_base36(nanos % 1000)
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        register_contract_types(&mut registry).unwrap();
        registry
    }

    #[test]
    fn registered_types_are_closed() {
        registry().check().unwrap();
    }

    #[test]
    fn err_shape_accepts_null_status() {
        let registry = registry();
        for value in [
            json!({ "error": "bad credentials", "status": 401 }),
            json!({ "error": "bad credentials", "status": null }),
        ] {
            assert!(registry.validate("Err", &value).unwrap().valid);
        }
        let report = registry
            .validate("Err", &json!({ "error": "x", "status": "401" }))
            .unwrap();
        assert!(!report.valid);
    }

    #[test]
    fn maybe_session_takes_either_shape() {
        let registry = registry();
        assert!(registry
            .validate("MaybeSession", &json!({ "session": { "_id": "s1" } }))
            .unwrap()
            .valid);
        assert!(registry
            .validate("MaybeSession", &json!({ "error": "nope", "status": 403 }))
            .unwrap()
            .valid);
    }

    #[test]
    fn logout_step_needs_a_session() {
        let plan = default_plan();
        assert_eq!(plan.len(), 4);
        let err = plan[1].resolve(Some(&json!({ "error": "x" }))).unwrap_err();
        assert!(err.to_string().contains("session._id"));
        let logout = plan[1]
            .resolve(Some(&json!({ "session": { "_id": "abc" } })))
            .unwrap();
        assert_eq!(logout.headers["Authorization"], "Bearer abc");
    }

    #[test]
    fn base36_digits() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
