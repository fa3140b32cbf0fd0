#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Read;
use std::net::TcpListener;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tiny_http::{Header, Response, Server, StatusCode};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Status and body text for a request.
pub type Reply = (u16, String);

/// Small JSON API on an ephemeral local port, stopped on drop.
pub struct MockApi {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
    server: Arc<Server>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MockApi {
    pub fn start<F>(handler: F) -> Result<Self>
    where
        F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        let port = listener.local_addr()?.port();
        let server = Arc::new(
            Server::from_listener(listener, None)
                .map_err(|err| anyhow!("failed to create HTTP server: {err}"))?,
        );
        let running = Arc::new(AtomicBool::new(true));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let server_for_thread = Arc::clone(&server);
        let running_flag = Arc::clone(&running);
        let recorded = Arc::clone(&requests);
        let thread = thread::spawn(move || {
            let mut incoming = server_for_thread.incoming_requests();
            while running_flag.load(Ordering::SeqCst) {
                match incoming.next() {
                    Some(mut request) => {
                        let mut body = String::new();
                        let _ = request.as_reader().read_to_string(&mut body);
                        let headers = request
                            .headers()
                            .iter()
                            .map(|h| (h.field.to_string().to_ascii_lowercase(), h.value.to_string()))
                            .collect();
                        let seen = RecordedRequest {
                            method: request.method().as_str().to_uppercase(),
                            path: request.url().to_string(),
                            headers,
                            body,
                        };
                        let (status, text) = handler(&seen);
                        recorded.lock().unwrap().push(seen);
                        let response = Response::from_string(text)
                            .with_status_code(StatusCode(status))
                            .with_header(
                                Header::from_bytes("content-type", "application/json").unwrap(),
                            );
                        let _ = request.respond(response);
                    }
                    None => {
                        if !running_flag.load(Ordering::SeqCst) {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            base_url: format!("http://127.0.0.1:{port}"),
            requests,
            server,
            running,
            thread: Some(thread),
        })
    }

    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.server.unblock();
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Login/logout/signup actions backed by a single known account.
pub fn session_api(request: &RecordedRequest) -> Reply {
    let body: Value = serde_json::from_str(&request.body).unwrap_or(Value::Null);
    let denied = (
        401,
        json!({ "error": "bad credentials", "status": 401 }).to_string(),
    );
    match request.path.as_str() {
        "/json/action/login" => {
            let username = body.get("username").and_then(Value::as_str);
            let password = body.get("password").and_then(Value::as_str);
            if username == Some("test9") && password == Some("abc123") {
                (200, json!({ "session": { "_id": "s1" } }).to_string())
            } else {
                denied
            }
        }
        "/json/action/logout" => {
            if request.header("authorization") == Some("Bearer s1") {
                (200, json!({ "session": { "_id": "s1" } }).to_string())
            } else {
                denied
            }
        }
        "/json/action/signup" => (
            200,
            json!({
                "email": body.get("email").cloned().unwrap_or(Value::Null),
                "username": body.get("username").cloned().unwrap_or(Value::Null),
            })
            .to_string(),
        ),
        _ => (404, json!({ "error": "Not found", "status": 404 }).to_string()),
    }
}

/// Base URL for a port nothing listens on.
pub fn closed_base_url() -> Result<String> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(format!("http://127.0.0.1:{port}"))
}
