use tracing::Level;

use dd_log_handler::error_field::WithStack;
use dd_log_handler::{logger, setup_log, Attr, Context, LogError};

fn handle_request(user_id: u64) -> Result<(), LogError> {
    let span = tracing::info_span!("request", trace_id = 5_432_109_876u64);
    let _guard = span.enter();

    // Every record logged inside the span carries dd.trace_id, whether it
    // goes through the logger or through a tracing macro.
    let ctx = Context::current();
    logger::info(&ctx, "request received", vec![Attr::u64("user_id", user_id)])?;

    let child = tracing::info_span!("db.query");
    let _child = child.enter();
    tracing::debug!(rows = 3u64, "query finished");

    let err = WithStack::new(std::io::Error::new(std::io::ErrorKind::Other, "cache miss"));
    tracing::warn!(error = &err as &dyn std::error::Error, "falling back to origin");
    Ok(())
}

fn main() -> Result<(), LogError> {
    setup_log(Level::DEBUG);
    handle_request(42)
}
