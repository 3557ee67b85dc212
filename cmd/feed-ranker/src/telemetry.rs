use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber. JSON lines unless `RUST_LOG_FORMAT=pretty`.
pub fn init_tracing() {
    let pretty = std::env::var("RUST_LOG_FORMAT").is_ok_and(|v| v == "pretty");
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    if pretty {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true),
            )
            .with(filter)
            .init();
    }
}
