//! Tracing subscriber setup. Logs go to stderr so stdout stays parseable.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `EASEL_LOG` wins over `RUST_LOG`, which
/// wins over `fallback_level` from the config file.
pub fn init(fallback_level: &str) {
    let filter = EnvFilter::try_from_env("EASEL_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
