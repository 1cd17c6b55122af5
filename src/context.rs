//! Ambient request context handed to handlers alongside each record.

use crate::layer::current_span_context;

/// Identifiers of the active distributed-tracing span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanContext {
    pub trace_id: u64,
}

/// Request-scoped carrier of the active tracing span, if any.
///
/// A context without a span is the normal case for background work and
/// is never treated as an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    span: Option<SpanContext>,
}

impl Context {
    /// Context with no active span.
    pub fn background() -> Self {
        Context::default()
    }

    pub fn with_span(span: SpanContext) -> Self {
        Context { span: Some(span) }
    }

    /// Capture the span the current thread is inside of.
    ///
    /// Requires [`SpanContextLayer`](crate::layer::SpanContextLayer) on the
    /// active `tracing` subscriber; without it the context is empty.
    pub fn current() -> Self {
        Context {
            span: current_span_context(),
        }
    }

    /// Resolve the active span.
    pub fn span(&self) -> Option<SpanContext> {
        self.span
    }
}

impl From<SpanContext> for Context {
    fn from(span: SpanContext) -> Self {
        Context::with_span(span)
    }
}
