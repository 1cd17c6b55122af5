use serde::Serialize;
use std::any::type_name;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Kind reported for errors whose concrete type is not known.
pub const UNKNOWN_ERROR_KIND: &str = "error";

/// Capability of an error to report the call stack it was created on.
pub trait StackTrace {
    /// Stack frames, most recent call first.
    fn stack_trace(&self) -> Vec<String>;
}

/// Error value carried inside a log attribute.
///
/// Cheap to clone. Remembers the concrete type name when it is built
/// from a concrete error. The [`StackTrace`] capability is detected on the
/// value itself: a [`WithStack`] keeps its frames whether it arrives
/// through [`ErrorValue::new`], [`ErrorValue::from_boxed`] or `From`.
#[derive(Clone)]
pub struct ErrorValue {
    error: Arc<dyn StdError + Send + Sync>,
    kind: Option<Cow<'static, str>>,
    stack: Option<Arc<dyn StackTrace + Send + Sync>>,
}

impl ErrorValue {
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        ErrorValue::erased(Box::new(err), Some(type_name::<E>()))
    }

    /// Wrap an error that can report its own stack frames.
    pub fn traced<E>(err: E) -> Self
    where
        E: StdError + StackTrace + Send + Sync + 'static,
    {
        let err = Arc::new(err);
        ErrorValue {
            error: err.clone(),
            kind: Some(Cow::Borrowed(type_name::<E>())),
            stack: Some(err),
        }
    }

    /// Wrap a type-erased error. Its kind falls back to
    /// [`UNKNOWN_ERROR_KIND`] unless it is a [`WithStack`] or the kind is
    /// set with [`ErrorValue::with_kind`].
    pub fn from_boxed(err: Box<dyn StdError + Send + Sync>) -> Self {
        ErrorValue::erased(err, None)
    }

    fn erased(err: Box<dyn StdError + Send + Sync>, kind: Option<&'static str>) -> Self {
        match err.downcast::<WithStack>() {
            Ok(traced) => ErrorValue::from_with_stack(Arc::from(traced)),
            Err(err) => ErrorValue {
                error: Arc::from(err),
                kind: kind.map(Cow::Borrowed),
                stack: None,
            },
        }
    }

    fn from_with_stack(traced: Arc<WithStack>) -> Self {
        ErrorValue {
            error: traced.clone(),
            kind: traced.kind.map(Cow::Borrowed),
            stack: Some(traced),
        }
    }

    /// Copy a borrowed error into an owned value. Frames and kind are kept
    /// when the error is a [`WithStack`]; any other kind is unknown.
    pub(crate) fn snapshot(err: &(dyn StdError + 'static)) -> Self {
        let (kind, frames) = match err.downcast_ref::<WithStack>() {
            Some(traced) => (traced.kind, traced.stack_trace()),
            None => (None, Vec::new()),
        };
        let captured = CapturedError {
            message: err.to_string(),
            frames,
        };
        ErrorValue::traced(captured).with_kind(kind.unwrap_or(UNKNOWN_ERROR_KIND))
    }

    /// Override the reported kind.
    pub fn with_kind(mut self, kind: impl Into<Cow<'static, str>>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.error
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl fmt::Debug for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorValue")
            .field("kind", &self.kind)
            .field("error", &self.error)
            .field("has_stack", &self.stack.is_some())
            .finish()
    }
}

impl From<WithStack> for ErrorValue {
    fn from(err: WithStack) -> Self {
        ErrorValue::from_with_stack(Arc::new(err))
    }
}

impl From<anyhow::Error> for ErrorValue {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<WithStack>() {
            Ok(traced) => traced.into(),
            Err(err) => {
                ErrorValue::traced(AnyhowError(err)).with_kind(type_name::<anyhow::Error>())
            }
        }
    }
}

/// `anyhow::Error` seen through `std::error::Error`, with the backtrace
/// anyhow captured (subject to `RUST_BACKTRACE`/`RUST_LIB_BACKTRACE`).
struct AnyhowError(anyhow::Error);

impl fmt::Display for AnyhowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for AnyhowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl StdError for AnyhowError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl StackTrace for AnyhowError {
    fn stack_trace(&self) -> Vec<String> {
        backtrace_frames(self.0.backtrace())
    }
}

#[derive(Debug)]
struct CapturedError {
    message: String,
    frames: Vec<String>,
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for CapturedError {}

impl StackTrace for CapturedError {
    fn stack_trace(&self) -> Vec<String> {
        self.frames.clone()
    }
}

/// Structured description of an error, as shipped in logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorField {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorField {
    /// Describe an error. Never fails: missing type information degrades
    /// to [`UNKNOWN_ERROR_KIND`], and `stack` is only set when the error
    /// exposes [`StackTrace`] with at least one frame.
    pub fn describe(err: &ErrorValue) -> Self {
        let kind = match err.kind.as_deref() {
            Some(kind) if !kind.is_empty() => kind.to_string(),
            _ => UNKNOWN_ERROR_KIND.to_string(),
        };

        let mut message = err.error.to_string();
        if message.is_empty() {
            message = kind.clone();
        }

        let stack = err
            .stack
            .as_ref()
            .and_then(|tracer| render_stack(&tracer.stack_trace()));

        ErrorField { kind, message, stack }
    }
}

/// Render frames one per line, most recent first.
///
/// Each frame is emitted as `"\n" + frame` and the single leading line
/// break is then dropped. Before that, line breaks at the edges of every
/// frame are trimmed and frames left empty are skipped, so the result
/// never starts with a line break and never holds blank lines. Returns
/// `None` when no frame remains.
pub fn render_stack(frames: &[String]) -> Option<String> {
    let mut rendered = String::new();
    for frame in frames {
        let frame = frame.trim_matches(|c: char| c == '\n' || c == '\r');
        if frame.is_empty() {
            continue;
        }
        rendered.push('\n');
        rendered.push_str(frame);
    }

    if rendered.starts_with('\n') {
        rendered.remove(0);
    }

    if rendered.is_empty() {
        None
    } else {
        Some(rendered)
    }
}

/// Wraps an error together with the backtrace captured at construction.
///
/// Display and `source` are forwarded to the wrapped error, and the
/// reported kind is the wrapped error's type name.
pub struct WithStack {
    inner: Box<dyn StdError + Send + Sync>,
    kind: Option<&'static str>,
    backtrace: Backtrace,
}

impl WithStack {
    pub fn new<E>(inner: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        WithStack {
            inner: Box::new(inner),
            kind: Some(type_name::<E>()),
            backtrace: Backtrace::force_capture(),
        }
    }

    /// Wrap a type-erased error; its kind is unknown.
    pub fn from_boxed(inner: Box<dyn StdError + Send + Sync>) -> Self {
        WithStack {
            inner,
            kind: None,
            backtrace: Backtrace::force_capture(),
        }
    }

    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.inner
    }

    pub fn into_inner(self) -> Box<dyn StdError + Send + Sync> {
        self.inner
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for WithStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for WithStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithStack")
            .field("kind", &self.kind)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl StdError for WithStack {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

impl StackTrace for WithStack {
    fn stack_trace(&self) -> Vec<String> {
        backtrace_frames(&self.backtrace)
    }
}

fn backtrace_frames(backtrace: &Backtrace) -> Vec<String> {
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    parse_backtrace(&backtrace.to_string())
}

/// Split the std backtrace rendering into frames.
///
/// Input lines look like `"  3: symbol"` optionally followed by
/// `"      at file:line:col"`; each frame becomes `"symbol\n\tat file:line:col"`.
fn parse_backtrace(rendered: &str) -> Vec<String> {
    let mut frames: Vec<String> = Vec::new();
    for line in rendered.lines() {
        let line = line.trim_start();
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                frame.push_str("\n\tat ");
                frame.push_str(location);
            }
            continue;
        }
        if let Some((index, symbol)) = line.split_once(": ") {
            if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) {
                frames.push(symbol.to_string());
            }
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug)]
    struct Framed {
        frames: Vec<String>,
    }

    impl fmt::Display for Framed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("framed failure")
        }
    }

    impl StdError for Framed {}

    impl StackTrace for Framed {
        fn stack_trace(&self) -> Vec<String> {
            self.frames.clone()
        }
    }

    #[derive(Debug)]
    struct Silent;

    impl fmt::Display for Silent {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            Ok(())
        }
    }

    impl StdError for Silent {}

    #[test]
    fn plain_error_has_kind_and_message_but_no_stack() {
        let err = ErrorValue::new(io::Error::new(io::ErrorKind::NotFound, "missing file"));
        let field = ErrorField::describe(&err);

        assert_eq!(field.kind, type_name::<io::Error>());
        assert_eq!(field.message, "missing file");
        assert_eq!(field.stack, None);
    }

    #[test]
    fn boxed_error_falls_back_to_placeholder_kind() {
        let boxed: Box<dyn StdError + Send + Sync> = "plain text failure".into();
        let field = ErrorField::describe(&ErrorValue::from_boxed(boxed));

        assert_eq!(field.kind, UNKNOWN_ERROR_KIND);
        assert_eq!(field.message, "plain text failure");
    }

    #[test]
    fn explicit_kind_wins_over_type_name() {
        let err = ErrorValue::new(io::Error::new(io::ErrorKind::Other, "x"))
            .with_kind("upstream.Timeout");
        assert_eq!(ErrorField::describe(&err).kind, "upstream.Timeout");
    }

    #[test]
    fn empty_display_still_yields_a_message() {
        let field = ErrorField::describe(&ErrorValue::new(Silent));
        assert!(!field.message.is_empty());
        assert_eq!(field.message, field.kind);
    }

    #[test]
    fn stack_frames_are_joined_most_recent_first() {
        let err = ErrorValue::traced(Framed {
            frames: vec!["handler.serve".into(), "main.main".into()],
        });
        let field = ErrorField::describe(&err);

        assert_eq!(field.stack.as_deref(), Some("handler.serve\nmain.main"));
        assert_eq!(field.message, "framed failure");
    }

    #[test]
    fn stack_never_starts_with_a_line_break() {
        let err = ErrorValue::traced(Framed {
            frames: vec!["\n\nhandler.serve\n".into(), "main.main".into()],
        });
        let stack = ErrorField::describe(&err).stack.expect("stack present");
        assert!(!stack.starts_with('\n'));
        assert_eq!(stack, "handler.serve\nmain.main");
    }

    #[test]
    fn empty_frame_list_gives_no_stack() {
        let err = ErrorValue::traced(Framed { frames: Vec::new() });
        assert_eq!(ErrorField::describe(&err).stack, None);
    }

    fn disk_full() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "disk full")
    }

    fn assert_traced(err: &ErrorValue) {
        let field = ErrorField::describe(err);
        assert_eq!(field.message, "disk full");
        assert_eq!(field.kind, type_name::<io::Error>());
        let stack = field.stack.expect("stack captured by WithStack");
        assert!(!stack.is_empty());
        assert!(!stack.starts_with('\n'));
    }

    #[test]
    fn with_stack_keeps_frames_through_into() {
        let err: ErrorValue = WithStack::new(disk_full()).into();
        assert_traced(&err);
    }

    #[test]
    fn with_stack_keeps_frames_through_new() {
        assert_traced(&ErrorValue::new(WithStack::new(disk_full())));
    }

    #[test]
    fn with_stack_keeps_frames_when_boxed() {
        let boxed: Box<dyn StdError + Send + Sync> = Box::new(WithStack::new(disk_full()));
        assert_traced(&ErrorValue::from_boxed(boxed));
    }

    #[test]
    fn boxed_with_stack_has_unknown_kind_but_keeps_frames() {
        let traced = WithStack::from_boxed("flush failed".into());
        let field = ErrorField::describe(&ErrorValue::from(traced));
        assert_eq!(field.kind, UNKNOWN_ERROR_KIND);
        assert_eq!(field.message, "flush failed");
        assert!(field.stack.is_some());
    }

    #[test]
    fn anyhow_error_reports_message_and_kind() {
        let err = ErrorValue::from(anyhow::anyhow!("pool exhausted"));
        let field = ErrorField::describe(&err);
        assert_eq!(field.message, "pool exhausted");
        assert_eq!(field.kind, type_name::<anyhow::Error>());
        if let Some(stack) = field.stack {
            assert!(!stack.starts_with('\n'));
        }
    }

    #[test]
    fn anyhow_wrapping_with_stack_keeps_frames() {
        let err = ErrorValue::from(anyhow::Error::new(WithStack::new(disk_full())));
        assert_traced(&err);
    }

    #[test]
    fn snapshot_of_borrowed_with_stack_keeps_frames() {
        let traced = WithStack::new(disk_full());
        assert_traced(&ErrorValue::snapshot(&traced));
    }

    #[test]
    fn snapshot_of_plain_error_has_unknown_kind() {
        let field = ErrorField::describe(&ErrorValue::snapshot(&disk_full()));
        assert_eq!(field.kind, UNKNOWN_ERROR_KIND);
        assert_eq!(field.message, "disk full");
        assert_eq!(field.stack, None);
    }

    #[test]
    fn parse_backtrace_attaches_locations_to_frames() {
        let rendered =
            "   0: app::handler\n             at ./src/handler.rs:10:5\n   1: app::main\n";
        let frames = parse_backtrace(rendered);
        assert_eq!(
            frames,
            vec![
                "app::handler\n\tat ./src/handler.rs:10:5".to_string(),
                "app::main".to_string(),
            ]
        );
    }

    #[test]
    fn error_field_serializes_without_empty_stack() {
        let field = ErrorField {
            kind: "k".into(),
            message: "m".into(),
            stack: None,
        };
        let json = serde_json::to_value(&field).expect("serialize");
        assert_eq!(json, serde_json::json!({"kind": "k", "message": "m"}));
    }
}
