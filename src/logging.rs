use std::fmt;
use std::io::{stderr, stdout, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Error};
use humantime::format_rfc3339;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            other => Err(anyhow!("unsupported log level: {other}")),
        }
    }
}

#[derive(Clone)]
enum Sink {
    Console,
    Capture(Arc<Mutex<Vec<Value>>>),
}

/// JSON-lines logger. Entries below `min_level` are dropped.
#[derive(Clone)]
pub struct Logger {
    min_level: LogLevel,
    tags: Map<String, Value>,
    sink: Sink,
}

impl Default for Logger {
    fn default() -> Self {
        Self::console(LogLevel::Info)
    }
}

impl Logger {
    pub fn console(min_level: LogLevel) -> Self {
        Self {
            min_level,
            tags: Map::new(),
            sink: Sink::Console,
        }
    }

    /// Keeps entries in memory instead of printing them.
    pub fn capturing(min_level: LogLevel) -> (Self, Arc<Mutex<Vec<Value>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let logger = Self {
            min_level,
            tags: Map::new(),
            sink: Sink::Capture(buffer.clone()),
        };
        (logger, buffer)
    }

    /// Adds stable tags; only strings, numbers and booleans are kept.
    pub fn with_tags(mut self, tags: Map<String, Value>) -> Self {
        self.tags.extend(stable_tags(tags));
        self
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    pub fn log(&self, level: LogLevel, message: &str, data: Option<Value>) {
        if !self.enabled(level) {
            return;
        }
        let mut entry = Map::new();
        entry.insert("level".to_string(), Value::String(level.as_str().to_string()));
        entry.insert("message".to_string(), Value::String(message.to_string()));
        if let Some(data) = data {
            entry.insert("data".to_string(), data);
        }
        if !self.tags.is_empty() {
            entry.insert("tags".to_string(), Value::Object(self.tags.clone()));
        }
        entry.insert("timestamp".to_string(), Value::String(current_timestamp()));

        match &self.sink {
            Sink::Console => write_console(level, &entry),
            Sink::Capture(buffer) => {
                if let Ok(mut captured) = buffer.lock() {
                    captured.push(Value::Object(entry));
                }
            }
        }
    }

    pub fn debug(&self, message: &str, data: Option<Value>) {
        self.log(LogLevel::Debug, message, data);
    }

    pub fn info(&self, message: &str, data: Option<Value>) {
        self.log(LogLevel::Info, message, data);
    }

    pub fn warn(&self, message: &str, data: Option<Value>) {
        self.log(LogLevel::Warn, message, data);
    }

    pub fn error(&self, message: &str, data: Option<Value>) {
        self.log(LogLevel::Error, message, data);
    }
}

fn current_timestamp() -> String {
    let now = std::time::SystemTime::now();
    format_rfc3339(now).to_string()
}

fn stable_tags(tags: Map<String, Value>) -> Map<String, Value> {
    tags.into_iter()
        .filter(|(_, val)| matches!(val, Value::String(_) | Value::Number(_) | Value::Bool(_)))
        .collect()
}

fn write_console(level: LogLevel, entry: &Map<String, Value>) {
    if let Ok(serialized) = serde_json::to_string(entry) {
        if level >= LogLevel::Error {
            let _ = writeln!(stderr(), "{}", serialized);
        } else {
            let _ = writeln!(stdout(), "{}", serialized);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filters_by_level_and_merges_tags() {
        let (logger, captured) = Logger::capturing(LogLevel::Info);
        let mut tags = Map::new();
        tags.insert("component".into(), json!("contract"));
        tags.insert("nested".into(), json!({ "dropped": true }));
        let logger = logger.with_tags(tags);

        logger.debug("hidden", None);
        logger.warn("shown", Some(json!({ "index": 2 })));

        let entries = captured.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["level"], json!("warn"));
        assert_eq!(entries[0]["data"], json!({ "index": 2 }));
        assert_eq!(entries[0]["tags"], json!({ "component": "contract" }));
        assert!(entries[0]["timestamp"].as_str().is_some());
    }

    #[test]
    fn parses_levels() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
