use crate::context::Context;
use crate::error::LogError;
use crate::handler::Handler;
use crate::json::{HandlerOptions, JsonHandler};
use crate::record::{Attr, LogRecord};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tracing::Level;

/// Process-wide default logger. Replaced wholesale by [`set_default`].
static DEFAULT: ArcSwapOption<Logger> = ArcSwapOption::const_empty();

/// Front-end that turns logging calls into [`LogRecord`]s for a [`Handler`].
///
/// Cloning is cheap; clones share the handler.
#[derive(Clone)]
pub struct Logger {
    handler: Arc<dyn Handler>,
}

impl Logger {
    pub fn new(handler: impl Handler + 'static) -> Self {
        Logger {
            handler: Arc::new(handler),
        }
    }

    pub fn from_boxed(handler: Box<dyn Handler>) -> Self {
        Logger {
            handler: Arc::from(handler),
        }
    }

    pub fn handler(&self) -> &dyn Handler {
        &*self.handler
    }

    /// Logger whose records also carry `attrs`.
    pub fn with(&self, attrs: Vec<Attr>) -> Logger {
        if attrs.is_empty() {
            return self.clone();
        }
        Logger::from_boxed(self.handler.with_attrs(attrs))
    }

    /// Logger that nests further attributes under `name`.
    pub fn with_group(&self, name: &str) -> Logger {
        if name.is_empty() {
            return self.clone();
        }
        Logger::from_boxed(self.handler.with_group(name))
    }

    pub fn enabled(&self, level: Level) -> bool {
        self.handler.enabled(level)
    }

    /// Emit a record. Write failures are returned, not swallowed.
    pub fn log(
        &self,
        ctx: &Context,
        level: Level,
        message: impl Into<String>,
        attrs: Vec<Attr>,
    ) -> Result<(), LogError> {
        if !self.enabled(level) {
            return Ok(());
        }
        let record = LogRecord::new(level, message).with_attrs(attrs);
        self.handler.handle(ctx, record)
    }

    pub fn debug(
        &self,
        ctx: &Context,
        message: impl Into<String>,
        attrs: Vec<Attr>,
    ) -> Result<(), LogError> {
        self.log(ctx, Level::DEBUG, message, attrs)
    }

    pub fn info(
        &self,
        ctx: &Context,
        message: impl Into<String>,
        attrs: Vec<Attr>,
    ) -> Result<(), LogError> {
        self.log(ctx, Level::INFO, message, attrs)
    }

    pub fn warn(
        &self,
        ctx: &Context,
        message: impl Into<String>,
        attrs: Vec<Attr>,
    ) -> Result<(), LogError> {
        self.log(ctx, Level::WARN, message, attrs)
    }

    pub fn error(
        &self,
        ctx: &Context,
        message: impl Into<String>,
        attrs: Vec<Attr>,
    ) -> Result<(), LogError> {
        self.log(ctx, Level::ERROR, message, attrs)
    }
}

/// Install `logger` as the process-wide default.
///
/// This replaces any previous default entirely. Concurrent calls race and
/// the last store wins; callers that care must serialize initialization.
pub fn set_default(logger: Logger) {
    DEFAULT.store(Some(Arc::new(logger)));
}

/// The installed default logger, or a plain JSON logger on stderr at
/// `INFO` when nothing has been installed yet.
pub fn default_logger() -> Arc<Logger> {
    DEFAULT.load_full().unwrap_or_else(|| {
        let fallback = JsonHandler::new(std::io::stderr, HandlerOptions::default());
        Arc::new(Logger::new(fallback))
    })
}

/// Emit through the default logger.
pub fn log(
    ctx: &Context,
    level: Level,
    message: impl Into<String>,
    attrs: Vec<Attr>,
) -> Result<(), LogError> {
    default_logger().log(ctx, level, message, attrs)
}

pub fn debug(ctx: &Context, message: impl Into<String>, attrs: Vec<Attr>) -> Result<(), LogError> {
    log(ctx, Level::DEBUG, message, attrs)
}

pub fn info(ctx: &Context, message: impl Into<String>, attrs: Vec<Attr>) -> Result<(), LogError> {
    log(ctx, Level::INFO, message, attrs)
}

pub fn warn(ctx: &Context, message: impl Into<String>, attrs: Vec<Attr>) -> Result<(), LogError> {
    log(ctx, Level::WARN, message, attrs)
}

pub fn error(ctx: &Context, message: impl Into<String>, attrs: Vec<Attr>) -> Result<(), LogError> {
    log(ctx, Level::ERROR, message, attrs)
}
