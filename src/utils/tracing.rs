//! Logging initialisation

use crate::config::LogFormat;
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` wins, otherwise `level` applies to this
/// crate and `warn` to everything else.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,{krate}={level},cookie_relay={level},tower_http={level}",
            krate = env!("CARGO_CRATE_NAME"),
            level = level
        ))
    })
}

/// Install the global subscriber. Calling it twice is harmless; the second
/// call reports the failure on stderr and leaves the first one in place.
pub fn init_tracing(level: &str, format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_target(true);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };

    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}
