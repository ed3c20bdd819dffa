//! Structured logger handed to bricks through their options.
//!
//! A `Logger` carries context fields (run id, brick id, depth) and forwards
//! every message to `tracing`. Logging has no failure path, so it can never
//! abort a run.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Logger {
    fields: Vec<(String, String)>,
}

/// Renders the context fields as `key=value key=value`.
struct Fields<'a>(&'a [(String, String)]);

impl fmt::Display for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a logger with one more context field. A field with the same key
    /// replaces the inherited one.
    pub fn child(&self, key: &str, value: impl fmt::Display) -> Self {
        let mut fields: Vec<_> = self
            .fields
            .iter()
            .filter(|(k, _)| k != key)
            .cloned()
            .collect();
        fields.push((key.to_string(), value.to_string()));
        Self { fields }
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        let context = Fields(&self.fields);
        match level {
            LogLevel::Debug => tracing::debug!(context = %context, "{message}"),
            LogLevel::Info => tracing::info!(context = %context, "{message}"),
            LogLevel::Warn => tracing::warn!(context = %context, "{message}"),
            LogLevel::Error => tracing::error!(context = %context, "{message}"),
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}
