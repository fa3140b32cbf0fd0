pub mod builtin;
pub mod http;
pub mod plan;

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::{json, Map, Value};
use url::Url;

use crate::config::RunnerConfig;
use crate::logging::Logger;
use crate::types::{TypeRegistry, UnknownTypeError, ValidationError};

pub use http::{HttpClient, HttpRequest, UreqClient};

pub const CONTENT_TYPE: &str = "Content-Type";
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// A fully resolved request plus the type its response must conform to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    pub endpoint: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    pub expected_type: String,
}

impl RequestSpec {
    /// POST with no body; the contract API only accepts posts.
    pub fn new(endpoint: impl Into<String>, expected_type: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: "POST".to_string(),
            headers: BTreeMap::new(),
            body: None,
            expected_type: expected_type.into(),
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_uppercase();
        self
    }

    /// Header names are case-insensitive; a later call replaces any earlier spelling.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers
            .retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        self.headers.insert(name, value.into());
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Headers as sent: caller headers, with `Content-Type` always forced to JSON.
    pub fn wire_headers(&self) -> BTreeMap<String, String> {
        let mut headers: BTreeMap<String, String> = self
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(CONTENT_TYPE))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        headers.insert(CONTENT_TYPE.to_string(), JSON_MEDIA_TYPE.to_string());
        headers
    }
}

pub type DeriveFn = Box<dyn Fn(Option<&Value>) -> Result<RequestSpec> + Send + Sync>;

/// One step of a contract run.
pub enum TestSpec {
    Literal(RequestSpec),
    /// Built from the previous step's parsed response (`None` for the first
    /// step, or when the previous step produced nothing parseable).
    Derived(DeriveFn),
}

impl TestSpec {
    pub fn derived<F>(build: F) -> Self
    where
        F: Fn(Option<&Value>) -> Result<RequestSpec> + Send + Sync + 'static,
    {
        TestSpec::Derived(Box::new(build))
    }

    pub fn resolve(&self, previous: Option<&Value>) -> Result<RequestSpec> {
        match self {
            TestSpec::Literal(spec) => Ok(spec.clone()),
            TestSpec::Derived(build) => build(previous),
        }
    }
}

impl From<RequestSpec> for TestSpec {
    fn from(spec: RequestSpec) -> Self {
        TestSpec::Literal(spec)
    }
}

impl fmt::Debug for TestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestSpec::Literal(spec) => f.debug_tuple("Literal").field(spec).finish(),
            TestSpec::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

/// Why a step failed. Recorded in the outcome; never raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepError {
    Validation {
        error: ValidationError,
    },
    SchemaMismatch {
        #[serde(rename = "typeName")]
        type_name: String,
        endpoint: String,
    },
    ChainResolution {
        message: String,
    },
    Endpoint {
        endpoint: String,
        message: String,
    },
    Network {
        context: String,
        error: String,
    },
    ResponseParse {
        context: String,
        error: String,
    },
    UnknownType {
        name: String,
    },
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepError::Validation { error } => write!(f, "{error}"),
            StepError::SchemaMismatch {
                type_name,
                endpoint,
            } => write!(f, "response from {endpoint} does not match {type_name}"),
            StepError::ChainResolution { message } => {
                write!(f, "could not build request from previous response: {message}")
            }
            StepError::Endpoint { endpoint, message } => write!(f, "{endpoint}: {message}"),
            StepError::Network { context, error } => write!(f, "{context}: {error}"),
            StepError::ResponseParse { context, error } => write!(f, "{context}: {error}"),
            StepError::UnknownType { name } => write!(f, "unknown type: {name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub index: usize,
    /// Absent when the request could not be resolved.
    pub request: Option<RequestSpec>,
    pub raw_response: Option<String>,
    pub parsed_response: Option<Value>,
    pub valid: bool,
    pub errors: Vec<StepError>,
    pub duration_ms: f64,
}

impl TestOutcome {
    fn failed(index: usize, request: Option<RequestSpec>, error: StepError) -> Self {
        Self {
            index,
            request,
            raw_response: None,
            parsed_response: None,
            valid: false,
            errors: vec![error],
            duration_ms: 0.0,
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.request.as_ref().map(|spec| spec.endpoint.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub outcomes: Vec<TestOutcome>,
    pub total_count: usize,
    pub failure_count: usize,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.failure_count == 0
    }
}

/// Runs test specs one after another against `base_url`, validating each
/// response with the shared registry.
pub struct ContractRunner<'r, C> {
    registry: &'r TypeRegistry,
    client: C,
    base_url: Url,
    endpoint_prefix: String,
    logger: Logger,
}

impl<'r, C: HttpClient> ContractRunner<'r, C> {
    pub fn new(registry: &'r TypeRegistry, client: C, config: &RunnerConfig) -> Self {
        Self {
            registry,
            client,
            base_url: config.base_url.clone(),
            endpoint_prefix: config.endpoint_prefix.clone(),
            logger: Logger::console(config.log_level).with_tags(run_tags(&config.base_url)),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger.with_tags(run_tags(&self.base_url));
        self
    }

    /// Executes every spec in order. Step failures are recorded and the run
    /// carries on; the only `Err` is a literal spec naming an unknown type,
    /// caught before anything is sent.
    pub fn run_all(&self, specs: &[TestSpec]) -> Result<RunReport, UnknownTypeError> {
        for spec in specs {
            if let TestSpec::Literal(request) = spec {
                if !self.registry.contains(&request.expected_type) {
                    return Err(UnknownTypeError {
                        name: request.expected_type.clone(),
                    });
                }
            }
        }

        let mut outcomes: Vec<TestOutcome> = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            let previous = outcomes
                .last()
                .and_then(|outcome| outcome.parsed_response.as_ref());
            let outcome = self.run_step(index, spec, previous);
            self.log_outcome(&outcome);
            outcomes.push(outcome);
        }

        let failure_count = outcomes.iter().filter(|outcome| !outcome.valid).count();
        let report = RunReport {
            total_count: outcomes.len(),
            failure_count,
            outcomes,
        };
        self.logger.info(
            "contract run completed",
            Some(json!({ "total": report.total_count, "failures": report.failure_count })),
        );
        Ok(report)
    }

    fn run_step(&self, index: usize, spec: &TestSpec, previous: Option<&Value>) -> TestOutcome {
        let started = Instant::now();
        let mut outcome = match self.resolve(index, spec, previous) {
            Ok(request) => self.execute(index, request),
            Err(err) => TestOutcome::failed(
                index,
                None,
                StepError::ChainResolution {
                    message: format!("{err:#}"),
                },
            ),
        };
        outcome.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        outcome
    }

    /// A derive function that panics fails its own step like one returning `Err`.
    fn resolve(&self, index: usize, spec: &TestSpec, previous: Option<&Value>) -> Result<RequestSpec> {
        match panic::catch_unwind(AssertUnwindSafe(|| spec.resolve(previous))) {
            Ok(resolved) => resolved,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.logger.error(
                    "contract request builder panicked",
                    Some(json!({ "index": index, "message": message })),
                );
                Err(anyhow!("request builder panicked: {message}"))
            }
        }
    }

    fn execute(&self, index: usize, request: RequestSpec) -> TestOutcome {
        let endpoint = request.endpoint.clone();
        let expected = request.expected_type.clone();

        if !endpoint.starts_with(&self.endpoint_prefix) {
            let message = format!("only endpoints under {} can be tested", self.endpoint_prefix);
            return TestOutcome::failed(index, Some(request), StepError::Endpoint { endpoint, message });
        }
        let url = match self.base_url.join(&endpoint) {
            Ok(url) => url,
            Err(err) => {
                let message = err.to_string();
                return TestOutcome::failed(index, Some(request), StepError::Endpoint { endpoint, message });
            }
        };

        let body = request.body.as_ref().map(Value::to_string);
        let wire = HttpRequest {
            method: request.method.clone(),
            headers: request.wire_headers(),
            body,
        };

        self.logger.debug(
            "sending contract request",
            Some(json!({ "index": index, "method": wire.method, "url": url.as_str() })),
        );
        let raw = match self.client.send(url.as_str(), &wire) {
            Ok(text) => text,
            Err(err) => {
                let error = StepError::Network {
                    context: format!("{} {endpoint}", wire.method),
                    error: format!("{err:#}"),
                };
                return TestOutcome::failed(index, Some(request), error);
            }
        };

        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                let mut outcome = TestOutcome::failed(
                    index,
                    Some(request),
                    StepError::ResponseParse {
                        context: format!("response from {endpoint} for {expected}"),
                        error: err.to_string(),
                    },
                );
                outcome.raw_response = Some(raw);
                return outcome;
            }
        };

        let mut errors = Vec::new();
        let valid = match self.registry.validate(&expected, &parsed) {
            Ok(report) => {
                errors.extend(
                    report
                        .errors
                        .into_iter()
                        .map(|error| StepError::Validation { error }),
                );
                if !report.valid {
                    errors.push(StepError::SchemaMismatch {
                        type_name: expected.clone(),
                        endpoint: endpoint.clone(),
                    });
                }
                report.valid
            }
            Err(err) => {
                errors.push(StepError::UnknownType { name: err.name });
                false
            }
        };

        TestOutcome {
            index,
            request: Some(request),
            raw_response: Some(raw),
            parsed_response: Some(parsed),
            valid,
            errors,
            duration_ms: 0.0,
        }
    }

    fn log_outcome(&self, outcome: &TestOutcome) {
        let data = json!({
            "index": outcome.index,
            "endpoint": outcome.endpoint(),
            "type": outcome.request.as_ref().map(|spec| spec.expected_type.as_str()),
            "errors": outcome.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
        });
        if outcome.valid {
            self.logger.info("contract step passed", Some(data));
        } else {
            self.logger.warn("contract step failed", Some(data));
        }
    }
}

fn run_tags(base_url: &Url) -> Map<String, Value> {
    let mut tags = Map::new();
    tags.insert("baseUrl".to_string(), Value::String(base_url.to_string()));
    tags
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_is_always_json() {
        let spec = RequestSpec::new("/json/x", "Any")
            .header("content-type", "text/plain")
            .header("X-Trace", "1");
        let headers = spec.wire_headers();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["Content-Type"], "application/json");
        assert_eq!(headers["X-Trace"], "1");
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let spec = RequestSpec::new("/json/x", "Any")
            .header("authorization", "Bearer lower")
            .bearer("upper");
        assert_eq!(spec.headers.len(), 1);
        assert_eq!(spec.headers["Authorization"], "Bearer upper");
        let wire = spec.wire_headers();
        assert_eq!(wire.len(), 2);
        assert_eq!(wire["Authorization"], "Bearer upper");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let caught = panic::catch_unwind(|| panic!("no session in {}", "response")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "no session in response");
        let caught = panic::catch_unwind(|| panic!("plain")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "plain");
    }

    #[test]
    fn literal_resolves_to_itself() {
        let spec = RequestSpec::new("/json/a", "Err").method("get");
        let resolved = TestSpec::from(spec.clone()).resolve(None).unwrap();
        assert_eq!(resolved, spec);
        assert_eq!(resolved.method, "GET");
    }

    #[test]
    fn step_errors_serialize_with_kind() {
        let err = StepError::SchemaMismatch {
            type_name: "Err".into(),
            endpoint: "/json/a".into(),
        };
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({ "kind": "schemaMismatch", "typeName": "Err", "endpoint": "/json/a" })
        );
    }
}
