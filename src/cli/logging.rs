//! Diagnostic logging to stderr
//!
//! `FSD_LOG` takes an `EnvFilter` directive (e.g. `fsd=debug`). Without it,
//! `--verbose` shows debug output, `--quiet` shows only errors and the
//! default is warnings.

use tracing_subscriber::EnvFilter;

use crate::cli::GlobalOpts;

pub const LOG_ENV: &str = "FSD_LOG";

fn default_directive(global: &GlobalOpts) -> &'static str {
    if global.verbose {
        "fsd=debug"
    } else if global.quiet {
        "error"
    } else {
        "warn"
    }
}

pub fn init(global: &GlobalOpts) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(global)));

    // A subscriber may already be installed when running under a test harness.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}
