use tracing_subscriber::{fmt, EnvFilter};

/// Logs go to stderr; stdout carries the JSON-lines protocol.
pub fn init_logger(filter: &str) {
    let filter_layer = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter_layer)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}
