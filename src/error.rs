/// Error returned when a handler fails to render or write a record.
///
/// Handlers never retry or swallow these; they travel back to whoever
/// emitted the record.
#[derive(thiserror::Error, Debug)]
pub enum LogError {
    #[error("failed to write log record: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),
}
