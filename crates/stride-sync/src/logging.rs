//! Tracing subscriber setup for the binary

use tracing_subscriber::EnvFilter;

/// Default filter: `debug` with `--verbose`, `info` otherwise
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Install the global subscriber; `RUST_LOG` takes precedence when set
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
