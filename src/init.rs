use crate::env::{env_or, DD_ENV, DD_SERVICE, DD_VERSION};
use crate::handler::{ContextHandler, TRACE_GROUP_KEY};
use crate::json::{HandlerOptions, JsonHandler};
use crate::layer::{LogEventLayer, SpanContextLayer};
use crate::logger::{set_default, Logger};
use crate::record::Attr;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::{LookupSpan, Registry};

/// Literal reported as `dd.source`.
pub const SOURCE: &str = "rust";

/// Unified service tags attached to every record under `dd`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub env: String,
    pub service: String,
    pub version: String,
}

impl ServiceIdentity {
    /// Read `DD_ENV`, `DD_SERVICE` and `DD_VERSION`. Missing variables
    /// become empty strings.
    pub fn from_env() -> Self {
        ServiceIdentity {
            env: env_or(DD_ENV, ""),
            service: env_or(DD_SERVICE, ""),
            version: env_or(DD_VERSION, ""),
        }
    }

    fn to_attr(&self, add_source: bool) -> Attr {
        let mut attrs = vec![
            Attr::string("env", self.env.as_str()),
            Attr::string("service", self.service.as_str()),
            Attr::string("version", self.version.as_str()),
        ];
        if add_source {
            attrs.push(Attr::string("source", SOURCE));
        }
        Attr::group(TRACE_GROUP_KEY, attrs)
    }
}

/// Logging setup options.
///
/// **Fields**
/// - `level`: least severe level that is written.
/// - `service`: identity attached under `dd` to every record.
/// - `add_source`: whether `dd.source` is set to [`SOURCE`].
/// - `install_subscriber`: whether setup also installs a global `tracing`
///   subscriber built from [`tracing_layer`], so that `tracing` events and
///   spans reach the default logger.
#[derive(Clone, Debug)]
pub struct LogConfig {
    pub level: Level,
    pub service: ServiceIdentity,
    pub add_source: bool,
    pub install_subscriber: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            service: ServiceIdentity::from_env(),
            add_source: true,
            install_subscriber: true,
        }
    }
}

/// Span tracking and event forwarding, ready to stack on a registry.
///
/// Events are written through the current default logger.
pub fn tracing_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    SpanContextLayer::new().and_then(LogEventLayer::new())
}

/// Build the JSON → trace decorator → service identity chain without
/// installing it.
pub fn build_logger<W>(config: &LogConfig, writer: W) -> Logger
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let json = JsonHandler::new(writer, HandlerOptions::normalized(config.level));
    Logger::new(ContextHandler::new(json)).with(vec![config.service.to_attr(config.add_source)])
}

/// Install a logger described by `config` writing to `writer` as the
/// process-wide default.
pub fn setup_log_with_config<W>(config: LogConfig, writer: W)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let logger = build_logger(&config, writer);
    set_default(logger);

    // A subscriber installed earlier stays in place.
    let subscriber = config.install_subscriber
        && tracing::subscriber::set_global_default(Registry::default().with(tracing_layer()))
            .is_ok();

    tracing::debug!(
        subscriber,
        level = %config.level,
        service = %config.service.service,
        env = %config.service.env,
        "installed default logger"
    );
}

/// Like [`setup_log`] but writing to `writer`, typically an in-memory
/// buffer in tests.
pub fn setup_log_with_writer<W>(level: Level, writer: W)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    setup_log_with_config(
        LogConfig {
            level,
            ..LogConfig::default()
        },
        writer,
    );
}

/// Install the default logger: JSON lines on stdout, filtered at `level`,
/// with trace correlation and Datadog field names. `tracing` events are
/// routed to it as well unless a global subscriber already exists.
///
/// Calling this again replaces the previous default.
pub fn setup_log(level: Level) {
    setup_log_with_writer(level, std::io::stdout);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, SpanContext};
    use crate::error_field::ErrorValue;
    use crate::test_support::Buffer;
    use serde_json::json;
    use std::io;

    fn config() -> LogConfig {
        LogConfig {
            level: Level::INFO,
            service: ServiceIdentity {
                env: "staging".into(),
                service: "checkout".into(),
                version: "1.4.2".into(),
            },
            add_source: true,
            install_subscriber: false,
        }
    }

    #[test]
    fn built_logger_carries_service_identity() {
        let buf = Buffer::default();
        let logger = build_logger(&config(), buf.clone());

        logger.info(&Context::background(), "ready", vec![]).unwrap();

        let line = &buf.json_lines()[0];
        assert_eq!(
            line["dd"],
            json!({"env": "staging", "service": "checkout", "version": "1.4.2", "source": "rust"})
        );
        assert_eq!(line["log"], "ready");
        assert!(line["@timestamp"].is_string());
    }

    #[test]
    fn trace_group_is_written_after_identity() {
        let buf = Buffer::default();
        let logger = build_logger(&config(), buf.clone());
        let ctx = Context::with_span(SpanContext { trace_id: 31337 });

        let err = io::Error::new(io::ErrorKind::TimedOut, "gateway timeout");
        logger
            .error(&ctx, "charge failed", vec![Attr::new("error", ErrorValue::new(err))])
            .unwrap();

        let text = buf.contents();
        let identity = text.find(r#""dd":{"env""#).expect("identity group");
        let trace = text.find(r#""dd":{"trace_id":31337}"#).expect("trace group");
        assert!(identity < trace);
        assert!(text.contains(r#""message":"gateway timeout""#));
    }

    #[test]
    fn source_can_be_left_out() {
        let buf = Buffer::default();
        let logger = build_logger(
            &LogConfig {
                add_source: false,
                ..config()
            },
            buf.clone(),
        );

        logger.info(&Context::background(), "m", vec![]).unwrap();

        assert!(buf.json_lines()[0]["dd"].get("source").is_none());
    }

    #[test]
    fn empty_identity_still_renders_fields() {
        let identity = ServiceIdentity::default().to_attr(true);
        assert_eq!(identity.key, TRACE_GROUP_KEY);
    }

    #[test]
    fn tracing_layer_tracks_span_context() {
        let subscriber = Registry::default().with(tracing_layer::<Registry>());
        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("request", trace_id = 11u64);
            let _guard = span.enter();
            assert_eq!(Context::current().span(), Some(SpanContext { trace_id: 11 }));
        });
    }
}
