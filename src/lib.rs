//! JSON log handler for services shipping logs to Datadog.
//!
//! Records get the active trace id under `dd.trace_id`, the built-in
//! `time`/`msg` fields are renamed to `@timestamp`/`log`, and error
//! attributes are expanded into `{kind, message, stack}`. `tracing` events
//! can be routed through the same handler chain.

pub mod context;
pub mod env;
pub mod error;
pub mod error_field;
pub mod handler;
pub mod init;
pub mod json;
pub mod layer;
pub mod logger;
pub mod normalize;
pub mod record;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::{Context, SpanContext};
pub use error::LogError;
pub use handler::{ContextHandler, Handler};
pub use init::{setup_log, setup_log_with_config, setup_log_with_writer, tracing_layer, LogConfig};
pub use layer::{LogEventLayer, SpanContextLayer};
pub use logger::Logger;
pub use record::{Attr, LogRecord, Value};
