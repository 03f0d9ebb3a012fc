use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter for the global subscriber: `RUST_LOG` when set, otherwise debug for
/// this crate with `verbose` and warnings only without.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose))
}

fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("toolchat=debug,info")
    } else {
        EnvFilter::new("warn")
    }
}

/// Install the global tracing subscriber. Diagnostics go to stderr so they never
/// mix with answers printed on stdout.
pub fn init(verbose: bool) {
    // A second init (tests, embedding) is not an error worth reporting.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(env_filter(verbose))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filters() {
        let verbose = default_filter(true).to_string();
        assert!(verbose.contains("toolchat=debug"));
        assert!(verbose.contains("info"));
        assert_eq!(default_filter(false).to_string(), "warn");
    }

    #[test]
    fn test_rust_log_overrides_verbose() {
        std::env::set_var("RUST_LOG", "toolchat=trace");
        let filter = env_filter(true);
        std::env::remove_var("RUST_LOG");
        assert_eq!(filter.to_string(), "toolchat=trace");
    }
}
