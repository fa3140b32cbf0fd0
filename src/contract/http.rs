use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

/// Request as handed to the transport. Body is already JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

/// Transport seam. Returns the raw response text whatever the status code;
/// `Err` only for failures to complete the exchange.
pub trait HttpClient {
    fn send(&self, url: &str, request: &HttpRequest) -> Result<String>;
}

impl<C: HttpClient + ?Sized> HttpClient for &C {
    fn send(&self, url: &str, request: &HttpRequest) -> Result<String> {
        (**self).send(url, request)
    }
}

impl<C: HttpClient + ?Sized> HttpClient for Box<C> {
    fn send(&self, url: &str, request: &HttpRequest) -> Result<String> {
        (**self).send(url, request)
    }
}

pub struct UreqClient {
    agent: ureq::Agent,
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new(None)
    }
}

impl UreqClient {
    pub fn new(timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(limit) = timeout {
            builder = builder.timeout(limit);
        }
        Self {
            agent: builder.build(),
        }
    }
}

impl HttpClient for UreqClient {
    fn send(&self, url: &str, request: &HttpRequest) -> Result<String> {
        let mut call = self.agent.request(&request.method, url);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }
        let outcome = match &request.body {
            Some(body) => call.send_string(body),
            None => call.call(),
        };
        let response = match outcome {
            Ok(response) => response,
            // error statuses still carry a body worth validating
            Err(ureq::Error::Status(_, response)) => response,
            Err(err) => return Err(anyhow!("{} {url} failed: {err}", request.method)),
        };
        response
            .into_string()
            .with_context(|| format!("failed to read response body from {url}"))
    }
}
