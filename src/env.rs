/// Environment variable names read when building the service identity
/// attached to every record. These follow Datadog's unified service
/// tagging.

/// Deployment environment, e.g. `prod` or `staging`.
pub const DD_ENV: &str = "DD_ENV";

/// Logical service name.
pub const DD_SERVICE: &str = "DD_SERVICE";

/// Deployed version of the service.
pub const DD_VERSION: &str = "DD_VERSION";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
