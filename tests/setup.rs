use dd_log_handler::logger;
use dd_log_handler::{setup_log_with_writer, Attr, Context, SpanContextLayer};
use std::io;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Buffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Buffer {
    type Writer = Buffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// The default logger is process-wide, so every scenario touching it runs
// inside this one test.
#[test]
fn setup_installs_default_logger() {
    let buf = Buffer::default();
    setup_log_with_writer(Level::INFO, buf.clone());

    let message = "this is our test message";
    let attrs = vec![Attr::string("key", "value")];
    logger::info(&Context::background(), message, attrs).unwrap();

    let output = buf.contents();
    assert!(!output.is_empty(), "expected log output, got none");
    assert!(output.contains(message), "expected {message:?} in {output}");

    let line: serde_json::Value = serde_json::from_str(output.trim_end()).unwrap();
    assert_eq!(line["log"], message);
    assert_eq!(line["key"], "value");
    assert_eq!(line["level"], "INFO");
    assert_eq!(line["dd"]["source"], "rust");
    assert!(line.get("msg").is_none());

    // Debug is below the configured level.
    logger::debug(&Context::background(), "not written", vec![]).unwrap();
    assert_eq!(buf.contents().lines().count(), 1);

    // Setup also installs the global subscriber: tracing events land in the
    // same output, with the same field names.
    tracing::info!(key = "value", "from a tracing event");
    tracing::debug!("filtered tracing event");
    let lines: Vec<serde_json::Value> =
        buf.contents().lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["log"], "from a tracing event");
    assert_eq!(lines[1]["key"], "value");
    assert_eq!(lines[1]["dd"]["source"], "rust");

    {
        let span = tracing::info_span!("request", trace_id = 1234u64);
        let _guard = span.enter();
        tracing::warn!("inside global span");
    }
    let output = buf.contents();
    assert!(output.contains(r#""dd":{"trace_id":1234}"#), "got {output}");
    let before_reinit = output.lines().count();

    // Re-initializing replaces the previous default outright.
    let second = Buffer::default();
    setup_log_with_writer(Level::DEBUG, second.clone());
    logger::debug(&Context::background(), "to the new buffer", vec![]).unwrap();
    tracing::info!("event after re-init");
    assert_eq!(buf.contents().lines().count(), before_reinit);
    assert!(second.contents().contains("to the new buffer"));
    assert!(second.contents().contains("event after re-init"));

    // Trace ids flow from the active tracing span into the record.
    let subscriber = Registry::default().with(SpanContextLayer::new());
    tracing::subscriber::with_default(subscriber, || {
        let span = tracing::info_span!("request", trace_id = 8_675_309u64);
        let _guard = span.enter();
        logger::info(&Context::current(), "inside span", vec![]).unwrap();
    });
    let traced = second.contents();
    assert!(traced.contains(r#""dd":{"trace_id":8675309}"#), "got {traced}");
}
