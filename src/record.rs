use crate::error_field::ErrorValue;
use chrono::{DateTime, Utc};
use std::error::Error as StdError;
use tracing::Level;

/// Key of the built-in timestamp field.
pub const TIME_KEY: &str = "time";
/// Key of the built-in level field.
pub const LEVEL_KEY: &str = "level";
/// Key of the built-in message field.
pub const MESSAGE_KEY: &str = "msg";
/// Conventional key for error-valued attributes.
pub const ERROR_KEY: &str = "error";

/// Typed value carried by an [`Attr`].
///
/// `Any` is the generic kind: an arbitrary JSON value. `Error` holds an
/// error that the attribute normalizer may expand into a group.
#[derive(Debug, Clone)]
pub enum Value {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Time(DateTime<Utc>),
    Group(Vec<Attr>),
    Error(ErrorValue),
    Any(serde_json::Value),
}

impl Value {
    pub fn is_group(&self) -> bool {
        matches!(self, Value::Group(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I64(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::U64(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::U64(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Time(value)
    }
}

impl From<ErrorValue> for Value {
    fn from(value: ErrorValue) -> Self {
        Value::Error(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Any(value)
    }
}

/// A single key/value pair attached to a log record.
#[derive(Debug, Clone)]
pub struct Attr {
    pub key: String,
    pub value: Value,
}

impl Attr {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Attr {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Attr::new(key, Value::String(value.into()))
    }

    pub fn u64(key: impl Into<String>, value: u64) -> Self {
        Attr::new(key, Value::U64(value))
    }

    pub fn i64(key: impl Into<String>, value: i64) -> Self {
        Attr::new(key, Value::I64(value))
    }

    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Attr::new(key, Value::Bool(value))
    }

    pub fn any(key: impl Into<String>, value: serde_json::Value) -> Self {
        Attr::new(key, Value::Any(value))
    }

    pub fn group(key: impl Into<String>, attrs: Vec<Attr>) -> Self {
        Attr::new(key, Value::Group(attrs))
    }

    /// Error attribute stored under [`ERROR_KEY`].
    pub fn error<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Attr::new(ERROR_KEY, Value::Error(ErrorValue::new(err)))
    }
}

/// One emitted log entry, built once per logging call.
///
/// Attribute keys are not unique; every attribute is serialized in the
/// order it was added.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub attrs: Vec<Attr>,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            attrs: Vec::new(),
        }
    }

    pub fn with_attrs(mut self, attrs: impl IntoIterator<Item = Attr>) -> Self {
        self.add_attrs(attrs);
        self
    }

    pub fn add_attrs(&mut self, attrs: impl IntoIterator<Item = Attr>) {
        self.attrs.extend(attrs);
    }
}
