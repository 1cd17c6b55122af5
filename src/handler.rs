use crate::context::Context;
use crate::error::LogError;
use crate::record::{Attr, LogRecord};
use tracing::Level;

/// Group key used by Datadog for correlation fields.
pub const TRACE_GROUP_KEY: &str = "dd";
/// Field inside [`TRACE_GROUP_KEY`] holding the trace id.
pub const TRACE_ID_KEY: &str = "trace_id";

/// Destination for [`LogRecord`]s.
///
/// Implementations render and write records (see
/// [`JsonHandler`](crate::json::JsonHandler)) or decorate another handler
/// (see [`ContextHandler`]). Deriving a handler never mutates the
/// original, so derivation may run concurrently with `handle`.
pub trait Handler: Send + Sync {
    /// Whether records at `level` would be written.
    fn enabled(&self, level: Level) -> bool;

    /// Render and write a single record.
    ///
    /// **Returns**
    /// - `Ok(())` once the record has been written or filtered out.
    /// - `Err(..)` if writing failed; the caller decides whether that is fatal.
    fn handle(&self, ctx: &Context, record: LogRecord) -> Result<(), LogError>;

    /// New handler whose records also carry `attrs`.
    fn with_attrs(&self, attrs: Vec<Attr>) -> Box<dyn Handler>;

    /// New handler that nests all further attributes under `name`.
    fn with_group(&self, name: &str) -> Box<dyn Handler>;
}

/// Decorator that appends the active trace id to every record before
/// passing it on to the wrapped handler.
pub struct ContextHandler {
    inner: Box<dyn Handler>,
}

impl ContextHandler {
    pub fn new(inner: impl Handler + 'static) -> Self {
        ContextHandler {
            inner: Box::new(inner),
        }
    }

    pub fn from_boxed(inner: Box<dyn Handler>) -> Self {
        ContextHandler { inner }
    }
}

impl Handler for ContextHandler {
    fn enabled(&self, level: Level) -> bool {
        self.inner.enabled(level)
    }

    fn handle(&self, ctx: &Context, mut record: LogRecord) -> Result<(), LogError> {
        if let Some(trace) = trace_attrs(ctx) {
            record.add_attrs([trace]);
        }
        self.inner.handle(ctx, record)
    }

    fn with_attrs(&self, attrs: Vec<Attr>) -> Box<dyn Handler> {
        Box::new(ContextHandler::from_boxed(self.inner.with_attrs(attrs)))
    }

    fn with_group(&self, name: &str) -> Box<dyn Handler> {
        Box::new(ContextHandler::from_boxed(self.inner.with_group(name)))
    }
}

/// `dd.trace_id` group for the span active in `ctx`, or `None` when there
/// is no span.
pub fn trace_attrs(ctx: &Context) -> Option<Attr> {
    let span = ctx.span()?;
    Some(Attr::group(
        TRACE_GROUP_KEY,
        vec![Attr::u64(TRACE_ID_KEY, span.trace_id)],
    ))
}
