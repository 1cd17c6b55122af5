use crate::context::Context;
use crate::error::LogError;
use crate::handler::Handler;
use crate::normalize;
use crate::record::{Attr, LogRecord, Value, LEVEL_KEY, MESSAGE_KEY, TIME_KEY};
use chrono::SecondsFormat;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

/// Per-attribute rewrite hook, called with the path of enclosing groups.
pub type ReplaceAttr = Arc<dyn Fn(&[String], Attr) -> Attr + Send + Sync>;

/// Options for [`JsonHandler`].
///
/// **Fields**
/// - `level`: least severe level that is still written.
/// - `replace_attr`: hook applied to every non-group attribute, including
///   the built-in `time`, `level` and `msg` fields, right before it is
///   serialized.
#[derive(Clone)]
pub struct HandlerOptions {
    pub level: Level,
    pub replace_attr: Option<ReplaceAttr>,
}

impl HandlerOptions {
    /// Options that filter at `level` and rewrite attributes with
    /// [`normalize::replace_attr`].
    pub fn normalized(level: Level) -> Self {
        HandlerOptions {
            level,
            replace_attr: Some(Arc::new(normalize::replace_attr)),
        }
    }
}

impl Default for HandlerOptions {
    fn default() -> Self {
        HandlerOptions {
            level: Level::INFO,
            replace_attr: None,
        }
    }
}

impl fmt::Debug for HandlerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerOptions")
            .field("level", &self.level)
            .field("replace_attr", &self.replace_attr.is_some())
            .finish()
    }
}

/// Handler that writes each record as one line of JSON.
///
/// The line is rendered into memory first and handed to the writer with a
/// single `write_all`, so concurrent callers never interleave as long as
/// the writer serializes individual writes (stdout and `Mutex<W>` do).
/// Duplicate keys are written as-is.
#[derive(Clone)]
pub struct JsonHandler {
    writer: Arc<BoxMakeWriter>,
    options: HandlerOptions,
    /// Groups opened with `with_group`, outermost first.
    groups: Vec<String>,
    /// `attrs[i]` were added while `i` groups were open.
    attrs: Vec<Vec<Attr>>,
}

impl JsonHandler {
    pub fn new<W>(writer: W, options: HandlerOptions) -> Self
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        JsonHandler {
            writer: Arc::new(BoxMakeWriter::new(writer)),
            options,
            groups: Vec::new(),
            attrs: vec![Vec::new()],
        }
    }

    pub fn stdout(options: HandlerOptions) -> Self {
        JsonHandler::new(std::io::stdout, options)
    }

    fn render(&self, record: LogRecord) -> Result<Vec<u8>, LogError> {
        let builtins = vec![
            Attr::any(
                TIME_KEY,
                serde_json::Value::String(
                    record.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                ),
            ),
            Attr::string(LEVEL_KEY, record.level.as_str()),
            Attr::any(MESSAGE_KEY, serde_json::Value::String(record.message)),
        ];

        // Wrap the record attributes in the open groups, innermost first.
        let depth = self.groups.len();
        let mut body = self.attrs[depth].clone();
        body.extend(record.attrs);
        for i in (0..depth).rev() {
            let mut outer = self.attrs[i].clone();
            outer.push(Attr::group(self.groups[i].clone(), body));
            body = outer;
        }

        let mut path = Vec::new();
        let mut fields = self.resolve(&mut path, builtins);
        fields.extend(self.resolve(&mut path, body));

        let mut buf = serde_json::to_vec(&Fields(&fields))?;
        buf.push(b'\n');
        Ok(buf)
    }

    /// Apply the rewrite hook to every leaf attribute and drop groups that
    /// end up empty.
    fn resolve(&self, path: &mut Vec<String>, attrs: Vec<Attr>) -> Vec<Attr> {
        let mut out = Vec::with_capacity(attrs.len());
        for attr in attrs {
            let attr = match attr.value {
                Value::Group(members) => {
                    let named = !attr.key.is_empty();
                    if named {
                        path.push(attr.key.clone());
                    }
                    let members = self.resolve(path, members);
                    if named {
                        path.pop();
                    }
                    if !members.is_empty() {
                        out.push(Attr::group(attr.key, members));
                    }
                    continue;
                }
                value => Attr {
                    key: attr.key,
                    value,
                },
            };

            let attr = match &self.options.replace_attr {
                Some(replace) => replace(path.as_slice(), attr),
                None => attr,
            };
            if matches!(&attr.value, Value::Group(members) if members.is_empty()) {
                continue;
            }
            out.push(attr);
        }
        out
    }
}

impl Handler for JsonHandler {
    fn enabled(&self, level: Level) -> bool {
        level <= self.options.level
    }

    fn handle(&self, _ctx: &Context, record: LogRecord) -> Result<(), LogError> {
        if !self.enabled(record.level) {
            return Ok(());
        }
        let line = self.render(record)?;
        let mut writer = self.writer.make_writer();
        writer.write_all(&line)?;
        Ok(())
    }

    fn with_attrs(&self, attrs: Vec<Attr>) -> Box<dyn Handler> {
        let mut derived = self.clone();
        if let Some(current) = derived.attrs.last_mut() {
            current.extend(attrs);
        }
        Box::new(derived)
    }

    fn with_group(&self, name: &str) -> Box<dyn Handler> {
        let mut derived = self.clone();
        if !name.is_empty() {
            derived.groups.push(name.to_string());
            derived.attrs.push(Vec::new());
        }
        Box::new(derived)
    }
}

/// Attributes serialized as a JSON object. Groups with an empty key are
/// inlined into their parent.
struct Fields<'a>(&'a [Attr]);

impl Serialize for Fields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        write_fields(&mut map, self.0)?;
        map.end()
    }
}

fn write_fields<M: SerializeMap>(map: &mut M, attrs: &[Attr]) -> Result<(), M::Error> {
    for attr in attrs {
        match &attr.value {
            Value::Group(members) if attr.key.is_empty() => write_fields(map, members)?,
            value => map.serialize_entry(&attr.key, &ValueRef(value))?,
        }
    }
    Ok(())
}

struct ValueRef<'a>(&'a Value);

impl Serialize for ValueRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::String(s) => serializer.serialize_str(s),
            Value::I64(n) => serializer.serialize_i64(*n),
            Value::U64(n) => serializer.serialize_u64(*n),
            Value::F64(n) => serializer.serialize_f64(*n),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Time(t) => {
                serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Group(members) => Fields(members).serialize(serializer),
            Value::Error(err) => serializer.collect_str(err),
            Value::Any(v) => v.serialize(serializer),
        }
    }
}
