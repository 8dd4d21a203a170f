//! previsit - terminal player for simulated pre-visit intake interviews
//!
//! Streams an interviewer/patient conversation from the demo backend, plays it
//! back one message at a time (paced by speech audio or a timer), tracks the
//! evolving clinical report with annotated diffs, and requests evaluations.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod api;
#[cfg(feature = "cli")]
pub mod app;
pub mod catalog;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod output;
pub mod playback;
pub mod report;
pub mod session;
pub mod stream;

// Core seams (channel -> sequencer -> presentation)
pub use api::{ApiClient, ReportEvaluator};
pub use playback::{AudioPlayer, PlaybackSink};

// Playback
pub use playback::{
    PlaybackDriver, PlaybackOutcome, PlaybackSettings, PlaybackStatus, Sequencer, Signal,
};
pub use session::{Session, SessionManager, SessionParams};

// Report
pub use report::{ReportTracker, compute_diff};

// Error handling
pub use error::{PrevisitError, Result};

// Config
pub use config::{Config, Pace};

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        // git checkouts embed a 7-char hash; tarball builds do not
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            assert!(
                ver.contains('+'),
                "With GIT_HASH set, version should contain '+', got: {}",
                ver
            );
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(
                hash_part.len(),
                7,
                "Git hash should be 7 chars, got: {}",
                hash_part
            );
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
