//! Logging and tracing configuration for sdc-unpack
//!
//! Structured logging through the `tracing` crate, written to stderr so
//! `--json` output on stdout stays clean.
//!
//! # Log Levels
//!
//! - `error` - Errors that end the run
//! - `warn`  - Forced integrity failures, skipped entries, unsafe names
//! - `info`  - Run progress (default)
//! - `debug` - Header, key file and per-entry details (`--verbose`)
//! - `trace` - Every inflate step
//!
//! # Environment Variable Control
//!
//! `RUST_LOG` overrides the defaults entirely:
//! ```bash
//! RUST_LOG=debug sdc-unpack office.sdc
//! RUST_LOG=sdc_unpack_lib::sdc::engine=trace sdc-unpack office.sdc
//! RUST_LOG=warn sdc-unpack office.sdc
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is not set
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose || cfg!(feature = "debug-logging") {
        "sdc_unpack=debug,sdc_unpack_lib=debug"
    } else {
        "sdc_unpack=info,sdc_unpack_lib=info"
    }
}

/// Initialize the logging/tracing system
///
/// Call this once at startup (in main.rs)
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(verbose)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact(),
    );

    // Ignore error if already set
    let _ = tracing::subscriber::set_global_default(subscriber);
}
