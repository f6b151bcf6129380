//! callguard - voice-phishing detection relay
//!
//! Accepts sentinel-framed audio streams from paired devices over TCP,
//! forwards each clip to an analysis service, and publishes a push alert to
//! the device owner when a call is flagged.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod analysis;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod defaults;
pub mod error;
pub mod framing;
pub mod logging;
pub mod push;
pub mod server;
pub mod session;

// Core seams (ingest → analyze → notify)
pub use analysis::{Analyzer, HttpAnalyzer, MockAnalyzer, Verdict};
pub use framing::{FrameEvent, FrameScanner};
pub use push::{HttpNotifier, MockNotifier, Notifier, PushMessage};
pub use session::{SessionContext, run_session};

// Error handling
pub use error::{CallguardError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
