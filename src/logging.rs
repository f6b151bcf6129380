//! Log subscriber setup.
//!
//! Level selection follows the CLI flags: `-q` shows warnings and errors
//! only, `-v` enables debug, `-vv` enables trace. An explicit `RUST_LOG`
//! always wins so operators can scope levels per module.

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. Call once at startup.
pub fn init(quiet: bool, verbose: u8) {
    let default_level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("callguard={default_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
