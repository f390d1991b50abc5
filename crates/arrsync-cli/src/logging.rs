//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive that overrides `-v`
pub const LOG_ENV: &str = "ARRSYNC_LOG";

/// Default filter for a verbosity level
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Logs go to stderr so that `--json`
/// output on stdout stays machine-readable.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let result = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_target(verbosity > 1)
        .with_writer(std::io::stderr)
        .try_init();
    if result.is_ok() {
        tracing::debug!(verbosity, "logging initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(default_directive(0), "warn");
        assert_eq!(default_directive(1), "info");
        assert_eq!(default_directive(2), "debug");
        assert_eq!(default_directive(7), "trace");
    }
}
