//! Tracing subscriber setup for the `narrator` binary.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter directive for the CLI verbosity flags.
pub fn level_directive(quiet: bool, verbosity: u8) -> &'static str {
    if quiet {
        return "warn";
    }
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the flags.
pub fn init_logging(quiet: bool, verbosity: u8) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(quiet, verbosity)));
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity > 0)
                .with_filter(env_filter),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive(false, 0), "info");
        assert_eq!(level_directive(false, 1), "debug");
        assert_eq!(level_directive(false, 5), "trace");
        assert_eq!(level_directive(true, 3), "warn");
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging(true, 0);
        init_logging(false, 2);
    }
}
