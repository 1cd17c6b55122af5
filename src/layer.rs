use crate::context::{Context, SpanContext};
use crate::error_field::ErrorValue;
use crate::logger::{default_logger, Logger};
use crate::record::{Attr, LogRecord};
use std::error::Error as StdError;
use std::fmt;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Span, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, Layer};
use tracing_subscriber::registry::{LookupSpan, Registry};

/// Span field read by [`SpanContextLayer`] unless configured otherwise.
pub const DEFAULT_TRACE_ID_FIELD: &str = "trace_id";

/// `tracing_subscriber` layer that remembers the distributed trace id of
/// each span so that [`Context::current`](crate::context::Context::current)
/// can find it later.
///
/// The trace id is read from a numeric span field (`trace_id` by default),
/// either when the span is created or when the field is recorded later.
/// Spans without the field inherit the trace id of their parent.
#[derive(Debug, Clone)]
pub struct SpanContextLayer {
    field: &'static str,
}

impl SpanContextLayer {
    pub fn new() -> Self {
        SpanContextLayer {
            field: DEFAULT_TRACE_ID_FIELD,
        }
    }

    /// Read the trace id from a differently named span field.
    pub fn with_field(field: &'static str) -> Self {
        SpanContextLayer { field }
    }
}

impl Default for SpanContextLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for SpanContextLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: LayerContext<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = TraceIdVisitor::new(self.field);
        attrs.record(&mut visitor);

        let trace_id = visitor.trace_id.or_else(|| {
            span.parent().and_then(|parent| {
                let extensions = parent.extensions();
                let inherited = extensions.get::<SpanContext>().map(|c| c.trace_id);
                inherited
            })
        });

        if let Some(trace_id) = trace_id {
            span.extensions_mut().replace(SpanContext { trace_id });
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: LayerContext<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = TraceIdVisitor::new(self.field);
        values.record(&mut visitor);

        if let Some(trace_id) = visitor.trace_id {
            span.extensions_mut().replace(SpanContext { trace_id });
        }
    }
}

/// `tracing_subscriber` layer that turns `tracing` events into records
/// for a [`Logger`].
///
/// The event's `message` becomes the record message and every other field
/// becomes an attribute. Fields recorded as `&dyn Error` are expanded like
/// any error attribute. The trace id comes from the event's span, so stack
/// this layer after a [`SpanContextLayer`].
///
/// Without a fixed logger each event goes to the current
/// [`default_logger`], which follows re-initialization.
#[derive(Clone, Default)]
pub struct LogEventLayer {
    logger: Option<Logger>,
}

impl LogEventLayer {
    pub fn new() -> Self {
        LogEventLayer { logger: None }
    }

    /// Always write through `logger`.
    pub fn with_logger(logger: Logger) -> Self {
        LogEventLayer {
            logger: Some(logger),
        }
    }
}

impl<S> Layer<S> for LogEventLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, ctx: LayerContext<'_, S>) {
        let default;
        let logger = match &self.logger {
            Some(logger) => logger,
            None => {
                default = default_logger();
                &*default
            }
        };

        let level = *event.metadata().level();
        if !logger.enabled(level) {
            return;
        }

        let mut visitor = AttrVisitor::default();
        event.record(&mut visitor);

        let span = ctx.event_span(event).and_then(|span| {
            let extensions = span.extensions();
            let found = extensions.get::<SpanContext>().copied();
            found
        });
        let context = match span {
            Some(span) => Context::with_span(span),
            None => Context::background(),
        };

        let record =
            LogRecord::new(level, visitor.message.unwrap_or_default()).with_attrs(visitor.attrs);
        if let Err(e) = logger.handler().handle(&context, record) {
            eprintln!("error writing log record: {}", e);
        }
    }
}

/// Look up the trace id stored for the current `tracing` span.
pub(crate) fn current_span_context() -> Option<SpanContext> {
    Span::current()
        .with_subscriber(|(id, dispatch)| {
            let registry = dispatch.downcast_ref::<Registry>()?;
            let span = registry.span(id)?;
            let extensions = span.extensions();
            let found = extensions.get::<SpanContext>().copied();
            found
        })
        .flatten()
}

#[derive(Default)]
struct AttrVisitor {
    message: Option<String>,
    attrs: Vec<Attr>,
}

impl Visit for AttrVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.attrs.push(Attr::string(field.name(), value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.attrs.push(Attr::i64(field.name(), value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.attrs.push(Attr::u64(field.name(), value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.attrs.push(Attr::new(field.name(), value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.attrs.push(Attr::bool(field.name(), value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn StdError + 'static)) {
        self.attrs.push(Attr::new(field.name(), ErrorValue::snapshot(value)));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.attrs.push(Attr::string(field.name(), format!("{:?}", value)));
        }
    }
}

struct TraceIdVisitor {
    field: &'static str,
    trace_id: Option<u64>,
}

impl TraceIdVisitor {
    fn new(field: &'static str) -> Self {
        TraceIdVisitor {
            field,
            trace_id: None,
        }
    }
}

impl Visit for TraceIdVisitor {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == self.field {
            self.trace_id = Some(value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == self.field {
            if let Ok(value) = u64::try_from(value) {
                self.trace_id = Some(value);
            }
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == self.field {
            if let Ok(value) = value.parse::<u64>() {
                self.trace_id = Some(value);
            }
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == self.field {
            if let Ok(value) = format!("{:?}", value).parse::<u64>() {
                self.trace_id = Some(value);
            }
        }
    }
}
