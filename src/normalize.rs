//! Per-attribute rewrite hook applied by the JSON handler right before
//! serialization.

use crate::error_field::{ErrorField, ErrorValue};
use crate::record::{Attr, Value, MESSAGE_KEY, TIME_KEY};

/// Key the log shipper expects for the record timestamp.
pub const TIMESTAMP_KEY: &str = "@timestamp";
/// Key the log shipper expects for the record message.
pub const LOG_KEY: &str = "log";

/// Rewrite one attribute for the log-shipping convention.
///
/// Errors become a `{kind, message, stack?}` group under the same key.
/// Generic values under the built-in `time` and `msg` keys are renamed to
/// `@timestamp` and `log`. Everything else passes through.
///
/// `groups` is the path of enclosing groups. Renaming does not depend on it.
pub fn replace_attr(_groups: &[String], mut attr: Attr) -> Attr {
    if let Value::Error(err) = &attr.value {
        let value = error_group(err);
        return Attr {
            key: attr.key,
            value,
        };
    }

    if let Value::Any(_) = &attr.value {
        let renamed = match attr.key.as_str() {
            TIME_KEY => Some(TIMESTAMP_KEY),
            MESSAGE_KEY => Some(LOG_KEY),
            _ => None,
        };
        if let Some(key) = renamed {
            attr.key = key.to_string();
        }
    }

    attr
}

/// Group value with `kind`, `message` and, when available, `stack`.
pub fn error_group(err: &ErrorValue) -> Value {
    let field = ErrorField::describe(err);

    let mut attrs = vec![
        Attr::string("kind", field.kind),
        Attr::string("message", field.message),
    ];
    if let Some(stack) = field.stack {
        attrs.push(Attr::string("stack", stack));
    }

    Value::Group(attrs)
}
