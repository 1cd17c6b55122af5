use std::io;
use tracing::Level;

use dd_log_handler::error_field::{ErrorValue, WithStack};
use dd_log_handler::{logger, setup_log, Attr, Context, LogError};

fn main() -> Result<(), LogError> {
    setup_log(Level::DEBUG);

    let ctx = Context::background();
    logger::info(&ctx, "starting service", vec![Attr::u64("port", 8080)])?;

    let err = io::Error::new(io::ErrorKind::ConnectionRefused, "upstream refused connection");
    logger::error(&ctx, "request failed", vec![Attr::error(err)])?;

    let traced = WithStack::new(io::Error::new(io::ErrorKind::Other, "disk full"));
    logger::error(&ctx, "flush failed", vec![Attr::error(traced)])?;

    let err: ErrorValue = anyhow::anyhow!("cache warmup aborted").into();
    logger::warn(&ctx, "degraded start", vec![Attr::new("error", err)])?;

    Ok(())
}
