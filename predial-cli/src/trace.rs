use predial::error::{BoxError, ErrorContext as _};
use tracing_subscriber::{
    EnvFilter, filter::Directive, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use std::io::IsTerminal as _;

/// Install the global tracing subscriber, filtered by `RUST_LOG`
/// and falling back to the given directive.
pub(crate) fn init_tracing(
    default_directive: impl Into<Directive>,
    json: bool,
) -> Result<(), BoxError> {
    if json {
        init_structured(default_directive)
    } else {
        init_default(default_directive)
    }
}

fn init_default(default_directive: impl Into<Directive>) -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(default_directive.into())
                .from_env_lossy(),
        )
        .try_init()
        .context("try init (default) tracing subscriber")?;

    Ok(())
}

fn init_structured(default_directive: impl Into<Directive>) -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(
            fmt::Layer::new()
                .with_ansi(std::io::stderr().is_terminal())
                .with_writer(std::io::stderr)
                .json()
                .flatten_event(true),
        )
        .with(
            EnvFilter::builder()
                .with_default_directive(default_directive.into())
                .from_env_lossy(),
        )
        .try_init()
        .context("try init (structured) tracing subscriber")?;

    Ok(())
}
