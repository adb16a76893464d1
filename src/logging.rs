//! Diagnostics setup for the command-line front end.
//!
//! Everything is written to stderr so stdout stays clean for line-finder
//! output and catalog listings.

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "gauge_catalog=info";
const VERBOSE_LOG_FILTER: &str = "gauge_catalog=debug";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks between info and
/// debug. Calling this twice is harmless, the second call is ignored.
pub fn init_logging(verbose: bool) {
    let fallback = if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
