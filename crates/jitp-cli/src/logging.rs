//! Log filter selection.

use tracing_subscriber::EnvFilter;

/// Filter from `rust_log` (the `RUST_LOG` value) when it parses, otherwise
/// `debug` with `--verbose` and `info` without.
pub fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}
